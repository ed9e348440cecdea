use criterion::{black_box, criterion_group, criterion_main, Criterion};
use oomkill::channel;
use oomkill::common::probe::{handle_mark_victim, KernelContext};
use oomkill::common::task::KernelMemory;
use oomkill::common::TaskOffsets;
use oomkill::ledger::BoundedLedger;

const OFFSETS: TaskOffsets = TaskOffsets {
    task_real_parent: 16,
    task_tgid: 8,
    task_mm: 24,
    task_exit_code: 4,
    mm_hiwater_rss: 16,
    _padding: 0,
};

/// Every read succeeds and returns the address, which is enough to walk the
/// parent and mm pointers.
struct EchoKernel;

impl KernelMemory for EchoKernel {
    fn read<T: Copy>(&self, addr: u64) -> Option<T> {
        let bytes = addr.to_ne_bytes();
        if std::mem::size_of::<T>() > bytes.len() {
            return None;
        }
        // SAFETY: size checked above, T is an integer in every read the handler makes
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
    }
}

impl KernelContext for EchoKernel {
    fn pid_tgid(&self) -> u64 {
        (4242 << 32) | 4242
    }

    fn ktime_ns(&self) -> u64 {
        1
    }

    fn current_task(&self) -> u64 {
        0x1000
    }
}

fn bench_handler(c: &mut Criterion) {
    let ledger = BoundedLedger::new();

    c.bench_function("mark_victim_with_space", |b| {
        let (producer, mut consumer) = channel::default_sized();
        b.iter(|| {
            handle_mark_victim(black_box(&EchoKernel), &ledger, &producer, &OFFSETS);
            consumer.pop()
        })
    });

    c.bench_function("mark_victim_channel_full", |b| {
        let (producer, _consumer) = channel::with_byte_size(32).expect("valid size");
        handle_mark_victim(&EchoKernel, &ledger, &producer, &OFFSETS);
        b.iter(|| handle_mark_victim(black_box(&EchoKernel), &ledger, &producer, &OFFSETS))
    });
}

criterion_group!(benches, bench_handler);
criterion_main!(benches);
