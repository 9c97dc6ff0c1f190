//! Span-tagged logging for the SMTP dialogue.
//!
//! `outgoing!` records what we write to the server and `incoming!` what the
//! server sends back. Both default to TRACE so a normal run stays quiet.

#[doc(hidden)]
#[macro_export]
macro_rules! wire {
    ($level:expr, $direction:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $direction);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::wire!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::wire!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}
