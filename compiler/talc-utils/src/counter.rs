//! Atomic-counter-backed identifier newtypes.
//!
//! Every stable handle the compiler hands out (job ids, scope ids, register
//! ids, ...) is produced by one of these. They are cheap `Copy` wrappers
//! around a `u32`, always produced through `new()` so that a process-wide
//! counter is the single source of truth for "has this index been seen
//! before".

/// Declare a new identifier type backed by a global atomic `u32` counter.
///
/// ```ignore
/// counter! {
///     name: JobId,
///     counter_name: JOB_ID_COUNTER,
///     visibility: pub,
/// }
/// ```
#[macro_export]
macro_rules! counter {
    (name: $name:ident, counter_name: $counter_name:ident, visibility: $visibility:vis, derives: ($($derive:ident),*)) => {
        static $counter_name: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

        #[derive($($derive),*)]
        $visibility struct $name(u32);

        impl $name {
            /// Create a new unique instance of this identifier.
            $visibility fn new() -> Self {
                Self($counter_name.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
            }

            /// The total number of instances of this identifier that have
            /// been created so far.
            $visibility fn total() -> u32 {
                $counter_name.load(std::sync::atomic::Ordering::Relaxed)
            }

            /// The raw numeric value of this identifier.
            $visibility fn index(&self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };

    (name: $name:ident, counter_name: $counter_name:ident, visibility: $visibility:vis) => {
        $crate::counter! {
            name: $name,
            counter_name: $counter_name,
            visibility: $visibility,
            derives: (Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)
        }
    };
}
