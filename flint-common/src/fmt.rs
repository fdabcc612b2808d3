// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Logging shim.
//!
//! Library code logs through these macros so the same call sites work on the
//! device (`defmt`), on the host (`log`) and in builds with no logger at all.
//! Format strings must stay within the subset both backends accept
//! (`{}`, `{:?}`, `0x{:08x}`).

macro_rules! log_event {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        defmt::$level!($fmt $(, $arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::$level!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        {
            $( let _ = &$arg; )*
        }
    }};
}

macro_rules! debug {
    ($($t:tt)*) => { $crate::fmt::log_event!(debug, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { $crate::fmt::log_event!(info, $($t)*) };
}

macro_rules! warning {
    ($($t:tt)*) => { $crate::fmt::log_event!(warn, $($t)*) };
}

pub(crate) use {debug, info, log_event, warning as warn};
