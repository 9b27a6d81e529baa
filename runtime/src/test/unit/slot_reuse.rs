//! Slot reuse under an adversarial executor.
//!
//! [`ManualQueue`] never runs anything by itself. The test thread picks a
//! random ready command and executes it while the driver keeps submitting
//! from another thread, and checks that no slot is overwritten while its
//! contents are still waiting to be read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tandem_device::{
    BufferId, CommandQueue, DeviceSpec, Event, ExecutionContext, HostAllocator, Kernel, KernelArgs, RowMultiply,
    Transfer,
};
use test_case::test_case;

use super::config;
use crate::driver::run_pipeline;
use crate::job::MatMulJob;

enum Work {
    Write(Vec<Transfer>),
    Launch(Arc<dyn Kernel>, KernelArgs),
    Read(Vec<Transfer>),
}

struct Pending {
    work: Work,
    wait_list: Vec<Event>,
    event: Event,
}

impl Pending {
    fn is_ready(&self) -> bool {
        self.wait_list.iter().all(Event::is_signaled)
    }
}

#[derive(Default)]
struct ManualQueue {
    pending: Mutex<Vec<Pending>>,
    drained: Condvar,
}

impl std::fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualQueue").field("pending", &self.pending.lock().len()).finish()
    }
}

impl ManualQueue {
    fn push(&self, work: Work, wait_list: &[Event]) -> tandem_device::Result<Event> {
        let event = Event::user();
        self.pending.lock().push(Pending { work, wait_list: wait_list.to_vec(), event: event.clone() });
        Ok(event)
    }

    fn take_ready(&self, rng: &mut StdRng) -> Option<Pending> {
        let mut pending = self.pending.lock();
        let ready: Vec<usize> = (0..pending.len()).filter(|&i| pending[i].is_ready()).collect();
        if ready.is_empty() {
            return None;
        }
        Some(pending.remove(ready[rng.gen_range(0..ready.len())]))
    }

    fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl CommandQueue for ManualQueue {
    fn name(&self) -> &str {
        "manual"
    }

    fn enqueue_write(&self, transfers: Vec<Transfer>, wait_list: &[Event]) -> tandem_device::Result<Event> {
        self.push(Work::Write(transfers), wait_list)
    }

    fn enqueue_kernel(
        &self,
        kernel: Arc<dyn Kernel>,
        args: KernelArgs,
        wait_list: &[Event],
    ) -> tandem_device::Result<Event> {
        self.push(Work::Launch(kernel, args), wait_list)
    }

    fn enqueue_read(&self, transfers: Vec<Transfer>, wait_list: &[Event]) -> tandem_device::Result<Event> {
        self.push(Work::Read(transfers), wait_list)
    }

    fn enqueue_task(&self, kernel: Arc<dyn Kernel>, args: KernelArgs) -> tandem_device::Result<Event> {
        self.push(Work::Launch(kernel, args), &[])
    }

    fn flush(&self) -> tandem_device::Result<()> {
        Ok(())
    }

    fn finish(&self) -> tandem_device::Result<()> {
        let mut pending = self.pending.lock();
        while !pending.is_empty() {
            self.drained.wait_for(&mut pending, Duration::from_millis(10));
        }
        Ok(())
    }
}

/// Device buffers written but not yet read, keyed by buffer id.
///
/// Violations are collected rather than asserted: a panic on the executor
/// thread would leave the driver waiting forever.
#[derive(Default)]
struct Liveness {
    live: HashMap<BufferId, bool>,
    writes: usize,
    violations: Vec<BufferId>,
}

impl Liveness {
    fn write(&mut self, id: BufferId) {
        let live = self.live.entry(id).or_default();
        if *live {
            self.violations.push(id);
        }
        *live = true;
        self.writes += 1;
    }

    fn read(&mut self, id: BufferId) {
        self.live.insert(id, false);
    }

    /// Check and apply the buffer effects of `work`, then run it.
    fn execute(&mut self, work: &Work) {
        match work {
            Work::Write(transfers) => {
                for transfer in transfers {
                    self.write(transfer.dst.id());
                    let _ = transfer.execute();
                }
            }
            Work::Launch(kernel, args) => {
                // lmult: [c, a, b_t]
                self.read(args.buffers[1].id());
                self.write(args.buffers[0].id());
                let _ = kernel.launch(args);
            }
            Work::Read(transfers) => {
                for transfer in transfers {
                    self.read(transfer.src.id());
                    let _ = transfer.execute();
                }
            }
        }
    }
}

#[test_case(1, 1 ; "single slot")]
#[test_case(2, 2 ; "double buffered")]
#[test_case(3, 3 ; "triple buffered")]
#[test_case(2, 4 ; "double buffered other seed")]
fn test_slot_never_overwritten_while_live(slots: usize, seed: u64) {
    let queue = Arc::new(ManualQueue::default());
    let ctx = ExecutionContext::new(
        DeviceSpec::default(),
        Arc::clone(&queue) as Arc<dyn CommandQueue>,
        Arc::new(HostAllocator),
        Arc::new(RowMultiply),
    );
    let job = MatMulJob::random_square(12, seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut liveness = Liveness::default();

    let run = std::thread::scope(|scope| {
        let driver = scope.spawn(|| run_pipeline(&ctx, config(slots, 1), &job));
        loop {
            match queue.take_ready(&mut rng) {
                Some(command) => {
                    liveness.execute(&command.work);
                    command.event.complete();
                    queue.drained.notify_all();
                }
                None if driver.is_finished() && queue.is_empty() => break,
                None => std::thread::sleep(Duration::from_micros(50)),
            }
        }
        driver.join().unwrap()
    })
    .unwrap();

    assert!(liveness.violations.is_empty(), "overwritten while live: {:?}", liveness.violations);
    assert_eq!(run.result, job.expected().unwrap());
    // Static load, then one load and one compute per chunk.
    assert_eq!(liveness.writes, 1 + 2 * run.chunks);
}
