//! Bounded reserve/commit ring channel
//!
//! A userspace implementation of the eBPF ring buffer protocol, used to
//! exercise the mark-victim handler outside the kernel:
//! - the arena is a power-of-two number of bytes, addressed in 8-byte words
//! - each record is an 8-byte header followed by its payload, padded to 8
//! - the header holds the payload length plus BUSY and DISCARD bits
//! - producers reserve under a short critical section (constant work, no
//!   waiting on the consumer) and fail immediately when the arena is full
//! - commit writes the payload, then clears BUSY with release ordering
//! - the single consumer stops at the first BUSY header, so records become
//!   visible in reservation order and never half-written

use crate::{OomKillError, Result};
use oomkill_common::probe::{EventChannel, EventSlot};
use oomkill_common::{OomKillEvent, RING_BUF_SIZE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const HEADER_SIZE: u64 = 8;
const BUSY_BIT: u64 = 1 << 31;
const DISCARD_BIT: u64 = 1 << 30;
const LEN_MASK: u64 = DISCARD_BIT - 1;

struct Ring {
    words: Box<[AtomicU64]>,
    mask: u64,
    producer_pos: AtomicU64,
    consumer_pos: AtomicU64,
    reserve_lock: Mutex<()>,
}

impl Ring {
    fn capacity(&self) -> u64 {
        (self.mask + 1) * 8
    }

    fn word(&self, pos: u64) -> &AtomicU64 {
        &self.words[((pos / 8) & self.mask) as usize]
    }
}

fn record_size(len: u64) -> u64 {
    (HEADER_SIZE + len + 7) & !7
}

/// Create a channel over an arena of `byte_size` bytes.
///
/// `byte_size` must be a power of two and a multiple of 8.
pub fn with_byte_size(byte_size: u32) -> Result<(Producer, Consumer)> {
    if byte_size < 16 || !byte_size.is_power_of_two() {
        return Err(OomKillError::ConfigError(format!(
            "ring size must be a power of two of at least 16 bytes, got {}",
            byte_size
        )));
    }

    Ok(build(byte_size))
}

/// Channel with the same arena size as the probe's `EVENTS` map.
pub fn default_sized() -> (Producer, Consumer) {
    build(RING_BUF_SIZE)
}

fn build(byte_size: u32) -> (Producer, Consumer) {
    let words = (0..byte_size / 8).map(|_| AtomicU64::new(0)).collect();
    let ring = Arc::new(Ring {
        words,
        mask: (byte_size / 8 - 1) as u64,
        producer_pos: AtomicU64::new(0),
        consumer_pos: AtomicU64::new(0),
        reserve_lock: Mutex::new(()),
    });

    (
        Producer {
            ring: Arc::clone(&ring),
        },
        Consumer { ring },
    )
}

/// Producer handle. Cheap to clone; every clone reserves from the same arena.
#[derive(Clone)]
pub struct Producer {
    ring: Arc<Ring>,
}

impl Producer {
    /// Reserve `len` payload bytes. `None` when the arena cannot fit the
    /// record right now.
    pub fn reserve(&self, len: usize) -> Option<Reservation> {
        let len = len as u64;
        if len > LEN_MASK {
            return None;
        }
        let size = record_size(len);
        let ring = &*self.ring;
        if size > ring.capacity() {
            return None;
        }

        let _guard = ring
            .reserve_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let consumer = ring.consumer_pos.load(Ordering::Acquire);
        let producer = ring.producer_pos.load(Ordering::Relaxed);
        if producer + size - consumer > ring.capacity() {
            return None;
        }

        ring.word(producer).store(len | BUSY_BIT, Ordering::Relaxed);
        ring.producer_pos.store(producer + size, Ordering::Release);

        Some(Reservation {
            ring: Arc::clone(&self.ring),
            header_pos: producer,
            len,
            done: false,
        })
    }

    /// Bytes reserved but not yet consumed.
    pub fn occupied(&self) -> u64 {
        let producer = self.ring.producer_pos.load(Ordering::Acquire);
        let consumer = self.ring.consumer_pos.load(Ordering::Acquire);
        producer - consumer
    }

    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }
}

/// Exclusive ownership of one reserved record.
///
/// Dropping a reservation without committing marks it discarded so the
/// consumer skips over it.
pub struct Reservation {
    ring: Arc<Ring>,
    header_pos: u64,
    len: u64,
    done: bool,
}

impl Reservation {
    /// Copy `payload` into the record and publish it. `payload` is truncated
    /// or zero-padded to the reserved length.
    pub fn commit(mut self, payload: &[u8]) {
        let data_pos = self.header_pos + HEADER_SIZE;
        for word_index in 0..(self.len + 7) / 8 {
            let start = (word_index * 8) as usize;
            let mut chunk = [0u8; 8];
            if start < payload.len() {
                let end = (start + 8).min(payload.len()).min(self.len as usize);
                chunk[..end - start].copy_from_slice(&payload[start..end]);
            }
            self.ring
                .word(data_pos + word_index * 8)
                .store(u64::from_ne_bytes(chunk), Ordering::Relaxed);
        }

        self.publish(self.len);
    }

    fn publish(&mut self, header: u64) {
        self.ring
            .word(self.header_pos)
            .store(header, Ordering::Release);
        self.done = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.done {
            self.publish(self.len | DISCARD_BIT);
        }
    }
}

/// The single reader of a channel.
pub struct Consumer {
    ring: Arc<Ring>,
}

impl Consumer {
    /// Take the next committed record, skipping discarded ones. Returns
    /// `None` if the channel is empty or the oldest record is still being
    /// written.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        let ring = &*self.ring;
        loop {
            let consumer = ring.consumer_pos.load(Ordering::Relaxed);
            let producer = ring.producer_pos.load(Ordering::Acquire);
            if consumer == producer {
                return None;
            }

            let header = ring.word(consumer).load(Ordering::Acquire);
            if header & BUSY_BIT != 0 {
                return None;
            }

            let len = header & LEN_MASK;
            let next = consumer + record_size(len);

            if header & DISCARD_BIT != 0 {
                ring.consumer_pos.store(next, Ordering::Release);
                continue;
            }

            let data_pos = consumer + HEADER_SIZE;
            let mut payload = Vec::with_capacity(len as usize);
            for word_index in 0..(len + 7) / 8 {
                let word = ring
                    .word(data_pos + word_index * 8)
                    .load(Ordering::Relaxed)
                    .to_ne_bytes();
                let take = ((len - word_index * 8) as usize).min(8);
                payload.extend_from_slice(&word[..take]);
            }

            ring.consumer_pos.store(next, Ordering::Release);
            return Some(payload);
        }
    }

    /// Drain every committed record currently available.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.pop()).collect()
    }
}

impl EventSlot for Reservation {
    fn commit(self, event: OomKillEvent) {
        Reservation::commit(self, &event.to_bytes());
    }
}

impl EventChannel for Producer {
    type Slot = Reservation;

    fn reserve(&self) -> Option<Reservation> {
        Producer::reserve(self, OomKillEvent::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(with_byte_size(0).is_err());
        assert!(with_byte_size(8).is_err());
        assert!(with_byte_size(1000).is_err());
        assert!(with_byte_size(1024).is_ok());
    }

    #[test]
    fn test_commit_then_pop() {
        let (producer, mut consumer) = with_byte_size(1024).unwrap();

        let slot = producer.reserve(5).expect("space");
        slot.commit(b"hello");

        assert_eq!(consumer.pop().as_deref(), Some(&b"hello"[..]));
        assert!(consumer.pop().is_none());
        assert_eq!(producer.occupied(), 0);
    }

    #[test]
    fn test_uncommitted_record_blocks_later_ones() {
        let (producer, mut consumer) = with_byte_size(1024).unwrap();

        let first = producer.reserve(8).unwrap();
        let second = producer.reserve(8).unwrap();
        second.commit(&2u64.to_ne_bytes());

        // The second record is complete but the first is still BUSY.
        assert!(consumer.pop().is_none());

        first.commit(&1u64.to_ne_bytes());
        assert_eq!(consumer.pop(), Some(1u64.to_ne_bytes().to_vec()));
        assert_eq!(consumer.pop(), Some(2u64.to_ne_bytes().to_vec()));
    }

    #[test]
    fn test_full_arena_fails_reserve() {
        // 64 bytes hold exactly two 24-byte records (32 bytes each with header).
        let (producer, mut consumer) = with_byte_size(64).unwrap();

        producer.reserve(24).unwrap().commit(&[1; 24]);
        producer.reserve(24).unwrap().commit(&[2; 24]);
        assert!(producer.reserve(24).is_none());
        assert!(producer.reserve(1).is_none());

        assert_eq!(consumer.pop(), Some(vec![1; 24]));
        let slot = producer.reserve(24).expect("space after consume");
        slot.commit(&[3; 24]);

        assert_eq!(consumer.drain(), vec![vec![2; 24], vec![3; 24]]);
    }

    #[test]
    fn test_records_wrap_around() {
        let (producer, mut consumer) = with_byte_size(64).unwrap();

        for round in 0u8..20 {
            producer.reserve(20).unwrap().commit(&[round; 20]);
            assert_eq!(consumer.pop(), Some(vec![round; 20]));
        }
    }

    #[test]
    fn test_dropped_reservation_is_skipped() {
        let (producer, mut consumer) = with_byte_size(1024).unwrap();

        drop(producer.reserve(16).unwrap());
        producer.reserve(3).unwrap().commit(b"abc");

        assert_eq!(consumer.pop(), Some(b"abc".to_vec()));
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn test_oversized_reservation() {
        let (producer, _consumer) = with_byte_size(64).unwrap();
        assert!(producer.reserve(57).is_none());
        assert!(producer.reserve(56).is_some());
    }

    #[test]
    fn test_default_sized_holds_8192_events() {
        let (producer, _consumer) = default_sized();
        assert_eq!(producer.capacity(), RING_BUF_SIZE as u64);

        for pid in 0..8192u32 {
            let slot = EventChannel::reserve(&producer).expect("space");
            EventSlot::commit(slot, OomKillEvent::new(pid, 1, 0, 0));
        }
        assert!(EventChannel::reserve(&producer).is_none());
    }
}
