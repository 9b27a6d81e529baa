use std::sync::Arc;
use std::time::Duration;

use super::{naive, transpose};
use crate::buffer::{Buffer, Transfer};
use crate::error::Error;
use crate::inject::{Injection, InjectionHook};
use crate::kernel::{KernelArgs, RowMultiply};
use crate::queue::{CommandQueue, OutOfOrderQueue};
use crate::sync::{CommandKind, CommandStatus, Event};

fn queue() -> OutOfOrderQueue {
    OutOfOrderQueue::builder().name("test".to_string()).compute_units(2).build().unwrap()
}

fn queue_with(hook: InjectionHook) -> OutOfOrderQueue {
    OutOfOrderQueue::builder().compute_units(2).hook(Arc::new(hook)).build().unwrap()
}

fn copy(src: &Buffer, dst: &Buffer) -> Vec<Transfer> {
    vec![Transfer::new(src.clone(), dst.clone()).unwrap()]
}

#[test]
fn test_write_kernel_read_chain() {
    let queue = queue();
    let (m, k, n) = (2, 3, 2);
    let a: Vec<i32> = (1..=6).collect();
    let b: Vec<i32> = (1..=6).collect();

    let host_a = Buffer::from_vec(a.clone());
    let host_bt = Buffer::from_vec(transpose(&b, k, n));
    let host_c = Buffer::zeroed(m * n);
    let (dev_a, dev_bt, dev_c) = (Buffer::zeroed(m * k), Buffer::zeroed(k * n), Buffer::zeroed(m * n));

    let mut transfers = copy(&host_a, &dev_a);
    transfers.extend(copy(&host_bt, &dev_bt));
    let write = queue.enqueue_write(transfers, &[]).unwrap();

    let args = KernelArgs::new().buffer(dev_c.clone()).buffer(dev_a).buffer(dev_bt).scalar(m).scalar(k).scalar(n);
    let kernel = queue.enqueue_kernel(Arc::new(RowMultiply), args, std::slice::from_ref(&write)).unwrap();
    let read = queue.enqueue_read(copy(&dev_c, &host_c), std::slice::from_ref(&kernel)).unwrap();

    read.wait().unwrap();
    assert_eq!(host_c.to_vec(), naive(&a, &b, m, k, n));
    assert!(write.is_complete() && kernel.is_complete());
    assert_eq!(read.kind(), CommandKind::ReadBuffer);
}

#[test]
fn test_wait_list_gates_execution() {
    let queue = queue();
    let gate = Event::user();
    let src = Buffer::from_vec(vec![7; 4]);
    let dst = Buffer::zeroed(4);

    let write = queue.enqueue_write(copy(&src, &dst), std::slice::from_ref(&gate)).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(write.status(), CommandStatus::Submitted);
    assert_eq!(dst.to_vec(), vec![0; 4]);

    gate.complete();
    write.wait().unwrap();
    assert_eq!(dst.to_vec(), vec![7; 4]);
}

#[test]
fn test_dependency_failure_propagates() {
    let queue = queue();
    let gate = Event::user();
    let dst = Buffer::zeroed(2);

    let write = queue.enqueue_write(copy(&Buffer::from_vec(vec![1, 2]), &dst), std::slice::from_ref(&gate)).unwrap();
    let read = queue.enqueue_read(copy(&dst, &Buffer::zeroed(2)), std::slice::from_ref(&write)).unwrap();

    gate.fail("host aborted");

    let err = read.wait().unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }));
    assert!(write.failure().unwrap().contains("host aborted"));
    assert!(read.failure().unwrap().contains("dependency"));
    // The write never ran.
    assert_eq!(dst.to_vec(), vec![0, 0]);
}

#[test]
fn test_closed_queue_rejects_submissions() {
    let queue = queue();
    queue.close();

    let err = queue.enqueue_task(Arc::new(RowMultiply), KernelArgs::new()).unwrap_err();
    assert!(matches!(err, Error::QueueClosed { ref queue } if queue == "test"));
}

#[test]
fn test_injected_rejection_is_synchronous() {
    let queue = queue_with(InjectionHook::new().inject(CommandKind::WriteBuffer, 1, Injection::Reject("full".into())));
    let (src, dst) = (Buffer::zeroed(1), Buffer::zeroed(1));

    assert!(queue.enqueue_write(copy(&src, &dst), &[]).is_ok());
    let err = queue.enqueue_write(copy(&src, &dst), &[]).unwrap_err();
    assert!(err.to_string().contains("full"));
    assert!(queue.enqueue_write(copy(&src, &dst), &[]).is_ok());

    queue.finish().unwrap();
    assert_eq!(queue.outstanding(), 0);
}

#[test]
fn test_injected_failure_settles_event() {
    let queue = queue_with(InjectionHook::new().inject(CommandKind::Task, 0, Injection::Fail("bitflip".into())));

    let task = queue.enqueue_task(Arc::new(RowMultiply), KernelArgs::new()).unwrap();
    assert_eq!(task.wait_settled(), CommandStatus::Failed("runtime error: bitflip".into()));
}

#[test]
fn test_kernel_error_fails_event() {
    let queue = queue();
    // No arguments bound: the kernel itself reports the error.
    let task = queue.enqueue_task(Arc::new(RowMultiply), KernelArgs::new()).unwrap();
    assert!(task.wait().is_err());
    assert!(task.failure().unwrap().contains("lmult"));
}

#[test]
fn test_injected_delay_is_profiled() {
    let delay = Duration::from_millis(30);
    let queue = queue_with(InjectionHook::new().inject(CommandKind::ReadBuffer, 0, Injection::Delay(delay)));

    let read = queue.enqueue_read(copy(&Buffer::zeroed(1), &Buffer::zeroed(1)), &[]).unwrap();
    read.wait().unwrap();
    assert!(read.profile().duration().unwrap() >= delay);
}

#[test]
fn test_independent_commands_overlap() {
    let delay = Duration::from_millis(50);
    let hook = InjectionHook::new()
        .inject(CommandKind::WriteBuffer, 0, Injection::Delay(delay))
        .inject(CommandKind::WriteBuffer, 1, Injection::Delay(delay));
    let queue = queue_with(hook);

    let first = queue.enqueue_write(copy(&Buffer::zeroed(1), &Buffer::zeroed(1)), &[]).unwrap();
    let second = queue.enqueue_write(copy(&Buffer::zeroed(1), &Buffer::zeroed(1)), &[]).unwrap();
    queue.finish().unwrap();

    let (a, b) = (first.profile(), second.profile());
    assert!(b.started.unwrap() < a.ended.unwrap(), "independent writes should run concurrently");
}

#[test]
fn test_finish_drains_everything() {
    let queue = queue();
    let events: Vec<Event> = (0..16)
        .map(|i| queue.enqueue_write(copy(&Buffer::from_vec(vec![i]), &Buffer::zeroed(1)), &[]).unwrap())
        .collect();

    queue.flush().unwrap();
    queue.finish().unwrap();

    assert!(events.iter().all(Event::is_complete));
    assert_eq!(queue.outstanding(), 0);
}
