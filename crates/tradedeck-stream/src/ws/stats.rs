/*
[INPUT]:  Frame, dispatch and reconnect events from the session worker
[OUTPUT]: Lock-free counters and snapshot-friendly stream statistics
[POS]:    Shared runtime metrics between the connection worker and callers
[UPDATE]: When adding/removing stream-level runtime signals
*/

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub frames_received: u64,
    pub frames_dispatched: u64,
    /// Frames that were malformed or could not be routed to a stream
    pub frames_dropped: u64,
    pub malformed_frames: u64,
    pub callback_failures: u64,
    pub connect_attempts: u64,
    /// Successful opens after the first one of a session
    pub reconnects: u64,
    /// Milliseconds since epoch of the last received frame, 0 if none
    pub last_frame_time: i64,
}

#[derive(Debug, Default)]
pub struct StreamStats {
    frames_received: AtomicU64,
    frames_dispatched: AtomicU64,
    frames_dropped: AtomicU64,
    malformed_frames: AtomicU64,
    callback_failures: AtomicU64,
    connect_attempts: AtomicU64,
    reconnects: AtomicU64,
    last_frame_time: AtomicI64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_frame_time: self.last_frame_time.load(Ordering::Relaxed),
        }
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.last_frame_time
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, callback_failures: usize) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
        if callback_failures > 0 {
            self.callback_failures
                .fetch_add(callback_failures as u64, Ordering::Relaxed);
        }
    }

    pub fn record_unroutable(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
}
