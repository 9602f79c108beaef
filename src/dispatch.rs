// Per-vendor command queues. Graph ticks enqueue and return immediately;
// one worker task per vendor drains its queue with cooldown spacing and
// retry-after handling, decoupled from the tick cadence.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::devices::{CommandOutcome, DeviceAdapter};
use crate::models::device::{DeviceDescriptor, Vendor};

#[derive(Clone, Copy, Debug)]
pub struct DispatchPolicy {
    /// Minimum spacing between consecutive sends to this vendor.
    pub cooldown: Duration,
    /// How many times a rate-limited entry is re-attempted before dropping.
    pub max_retries: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(1000),
            max_retries: 3,
        }
    }
}

impl DispatchPolicy {
    pub fn with_cooldown_ms(cooldown_ms: u64) -> Self {
        Self {
            cooldown: Duration::from_millis(cooldown_ms),
            ..Self::default()
        }
    }
}

struct QueueEntry {
    descriptor: DeviceDescriptor,
    enqueued_at: Instant,
}

/// Front end held by the runtime. `enqueue` never blocks and never touches
/// the network; vendors without a registered adapter reject the command.
#[derive(Default)]
pub struct CommandDispatcher {
    queues: HashMap<Vendor, mpsc::UnboundedSender<DeviceDescriptor>>,
    calls_sent: Arc<AtomicU64>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a worker for one vendor. Must be called from within a tokio
    /// runtime; re-registering a vendor replaces its queue.
    pub fn register(&mut self, adapter: Arc<dyn DeviceAdapter>, policy: DispatchPolicy) {
        let (tx, rx) = mpsc::unbounded_channel();
        let vendor = adapter.vendor();
        self.queues.insert(vendor, tx);
        tokio::spawn(vendor_worker(rx, adapter, policy, self.calls_sent.clone()));
        log::info!(
            "Dispatcher ready for {} (cooldown {}ms)",
            vendor,
            policy.cooldown.as_millis()
        );
    }

    pub fn is_registered(&self, vendor: Vendor) -> bool {
        self.queues.contains_key(&vendor)
    }

    pub fn enqueue(&self, descriptor: DeviceDescriptor) -> bool {
        match self.queues.get(&descriptor.vendor) {
            Some(tx) => tx.send(descriptor).is_ok(),
            None => {
                log::warn!("No dispatcher registered for {}", descriptor.vendor);
                false
            }
        }
    }

    /// Total commands accepted by vendors across all queues.
    pub fn calls_sent(&self) -> u64 {
        self.calls_sent.load(Ordering::Relaxed)
    }
}

/// Queue a descriptor, coalescing onto an already-queued entry for the same
/// device: the newer payload replaces the older one in place, keeping the
/// entry's position so per-device FIFO order is preserved.
fn push_coalesced(queue: &mut VecDeque<QueueEntry>, descriptor: DeviceDescriptor) {
    if let Some(existing) = queue
        .iter_mut()
        .find(|e| e.descriptor.device_key() == descriptor.device_key())
    {
        log::debug!("Coalescing queued command for {}", descriptor.device_key());
        existing.descriptor = descriptor;
    } else {
        queue.push_back(QueueEntry {
            descriptor,
            enqueued_at: Instant::now(),
        });
    }
}

/// Route a descriptor to the right adapter call. Power-off never goes
/// through a color command (Govee would interpret it as power-on).
async fn send_command(adapter: &dyn DeviceAdapter, descriptor: &DeviceDescriptor) -> CommandOutcome {
    if !descriptor.desired_power {
        adapter.set_power(descriptor, false).await
    } else if let Some(color) = descriptor.color.as_ref() {
        adapter.set_color(descriptor, color).await
    } else {
        adapter.set_power(descriptor, true).await
    }
}

async fn vendor_worker(
    mut rx: mpsc::UnboundedReceiver<DeviceDescriptor>,
    adapter: Arc<dyn DeviceAdapter>,
    policy: DispatchPolicy,
    calls_sent: Arc<AtomicU64>,
) {
    let vendor = adapter.vendor();
    let mut queue: VecDeque<QueueEntry> = VecDeque::new();
    let mut last_send: Option<Instant> = None;

    loop {
        if queue.is_empty() {
            // Idle: park until the next command arrives.
            match rx.recv().await {
                Some(descriptor) => push_coalesced(&mut queue, descriptor),
                None => break,
            }
        }
        while let Ok(descriptor) = rx.try_recv() {
            push_coalesced(&mut queue, descriptor);
        }

        // Enforce minimum spacing. A lone command arriving after an idle
        // period goes out immediately (zero-delay fast path).
        if let Some(prev) = last_send {
            let since = prev.elapsed();
            if since < policy.cooldown {
                tokio::time::sleep(policy.cooldown - since).await;
                // Late arrivals during the wait can still coalesce.
                while let Ok(descriptor) = rx.try_recv() {
                    push_coalesced(&mut queue, descriptor);
                }
            }
        }

        let Some(entry) = queue.pop_front() else {
            continue;
        };
        log::debug!(
            "{}: sending {:?} for {} (queued {}ms)",
            vendor,
            entry.descriptor.command,
            entry.descriptor.device_key(),
            entry.enqueued_at.elapsed().as_millis()
        );

        let mut attempts: u32 = 0;
        loop {
            let outcome = send_command(adapter.as_ref(), &entry.descriptor).await;
            last_send = Some(Instant::now());
            match outcome {
                CommandOutcome::Ok => {
                    calls_sent.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                CommandOutcome::RateLimited { retry_after_ms } => {
                    attempts += 1;
                    if attempts > policy.max_retries {
                        log::warn!(
                            "{}: dropping command for {} after {} rate-limited attempts",
                            vendor,
                            entry.descriptor.device_key(),
                            attempts
                        );
                        break;
                    }
                    log::warn!(
                        "{}: rate limited, retrying {} in {}ms",
                        vendor,
                        entry.descriptor.device_key(),
                        retry_after_ms
                    );
                    // The retried entry stays at the head; nothing else in
                    // this queue is processed until it completes or drops.
                    tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                }
                CommandOutcome::Failed(message) => {
                    log::warn!(
                        "{}: command for {} failed: {}",
                        vendor,
                        entry.descriptor.device_key(),
                        message
                    );
                    break;
                }
            }
        }
    }
}
