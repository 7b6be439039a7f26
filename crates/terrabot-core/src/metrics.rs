//! Atomic counters for engine observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at daemon shutdown).
//!
//! A `Metrics` is owned by whoever builds the engine and shared as an `Arc`,
//! so independent engines (and tests) never see each other's counts.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($($field:ident => $inc:ident),* $(,)?) => {
        /// Lightweight atomic counters, no allocations, no locking.
        #[derive(Debug, Default)]
        pub struct Metrics {
            $($field: AtomicU64,)*
        }

        impl Metrics {
            pub const fn new() -> Self {
                Self {
                    $($field: AtomicU64::new(0),)*
                }
            }

            $(
                pub fn $inc(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(metric = stringify!($field), "counter incremented");
                }

                pub fn $field(&self) -> u64 {
                    self.$field.load(Ordering::Relaxed)
                }
            )*

            /// Emit all current counter values as a single `info!` event.
            pub fn flush(&self) {
                tracing::info!(metric = "flush", $($field = self.$field(),)*);
            }

            /// Reset all counters to zero.
            pub fn reset(&self) {
                $(self.$field.store(0, Ordering::Relaxed);)*
            }
        }
    };
}

counters! {
    commands_started => inc_commands_started,
    commands_rejected_draining => inc_commands_rejected_draining,
    stale_commands_dropped => inc_stale_commands_dropped,
    units_executed => inc_units_executed,
    unit_panics => inc_unit_panics,
    event_panics => inc_event_panics,
    automerges => inc_automerges,
}
