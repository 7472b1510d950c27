//! Thread placement hints (spec.md §4.E, §5): the server façade pins the
//! receiver to one CPU core and the beacon to another, with the beacon
//! additionally raised to a soft realtime-ish priority so its once-a-second
//! broadcast stays on schedule even under receiver load. Failure to apply
//! either hint is not fatal — the original itself only "should" apply
//! these, not "must" — so failures are logged and the thread keeps running
//! at default placement/priority.

use log::warn;
use thread_priority::{ThreadPriority, ThreadPriorityValue};

/// Pins the calling thread to CPU `core_index` and, if `priority` is
/// `Some`, raises its scheduling priority to that value. Call this as the
/// first thing inside a freshly spawned thread's closure.
pub fn pin_and_prioritize(core_index: usize, priority: Option<u8>) {
    match core_affinity::get_core_ids() {
        Some(ids) => match ids.into_iter().find(|core| core.id == core_index) {
            Some(core) => {
                if !core_affinity::set_for_current(core) {
                    warn!("failed to pin thread to cpu {core_index}");
                }
            }
            None => warn!("cpu {core_index} not present on this host; continuing unpinned"),
        },
        None => warn!("could not enumerate cpu cores; continuing unpinned"),
    }

    if let Some(requested) = priority {
        match ThreadPriorityValue::try_from(requested) {
            Ok(value) => {
                if let Err(e) =
                    thread_priority::set_current_thread_priority(ThreadPriority::Crossplatform(value))
                {
                    warn!("failed to set thread priority to {requested}: {e:?}");
                }
            }
            Err(e) => warn!("invalid thread priority {requested}: {e:?}"),
        }
    }
}
