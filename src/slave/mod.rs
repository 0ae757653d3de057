//! Device side TWI slave driver.
//!
//! The hardware shifts bits, raises a start condition interrupt and a
//! counter overflow interrupt. The handlers feed those events into
//! [`SlaveDriver`], which answers with the [`Reaction`] the glue code must
//! program into the shift register before returning.
use core::cell::RefCell;

use critical_section::Mutex;

pub use self::ring::RingBuffer;

mod ring;

/// Byte shifted out when the application has nothing queued.
pub const FILLER_BYTE: u8 = 0xff;

/// General call address byte.
const GENERAL_CALL: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitAddress,
    SendDataByte,
    AwaitAckAfterSend,
    CheckReceivedAck,
    ReceiveDataByte,
    StoreByteAndAck,
}

/// What the hardware must do for the next overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Drive an acknowledge bit.
    SendAck,
    /// Shift out a full byte.
    SendByte(u8),
    /// Sample the master's acknowledge bit.
    ReadAck,
    /// Sample a full byte.
    ReadByte,
    /// Let go of SDA and wait for the next start condition.
    Release,
}

/// Application callbacks, run from interrupt context inside the critical section.
pub trait SlaveHandler {
    /// A write of `count` bytes just finished, by a stop or a repeated
    /// start; they are waiting in `rx`.
    fn on_receive<const N: usize>(&mut self, count: usize, rx: &mut RingBuffer<N>) {
        let _ = (count, rx);
    }

    /// The master addressed us for reading; queue the reply into `tx`.
    fn on_request<const N: usize>(&mut self, tx: &mut RingBuffer<N>) {
        let _ = tx;
    }
}

/// Callbacks that do nothing.
impl SlaveHandler for () {}

/// Protocol state and buffers, without any locking.
#[derive(Debug)]
pub struct Engine<const RX: usize, const TX: usize> {
    address: u8,
    state: State,
    received: usize,
    rx: RingBuffer<RX>,
    tx: RingBuffer<TX>,
}

impl<const RX: usize, const TX: usize> Engine<RX, TX> {
    pub const fn new(address: u8) -> Self {
        Engine {
            address,
            state: State::AwaitAddress,
            received: 0,
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn matches(&self, data: u8) -> bool {
        data >> 1 == self.address || data == GENERAL_CALL
    }

    /// A repeated start ends the pending write, which is reported first.
    pub fn on_start<H: SlaveHandler>(&mut self, handler: &mut H) -> Reaction {
        self.state = State::AwaitAddress;
        self.deliver(handler);
        Reaction::ReadByte
    }

    pub fn on_overflow<H: SlaveHandler>(&mut self, data: u8, handler: &mut H) -> Reaction {
        match self.state {
            State::AwaitAddress => {
                if !self.matches(data) {
                    return Reaction::Release;
                }
                if data & 1 != 0 {
                    handler.on_request(&mut self.tx);
                    self.state = State::SendDataByte;
                } else {
                    self.state = State::ReceiveDataByte;
                }
                Reaction::SendAck
            }
            State::SendDataByte => self.send_next(),
            State::AwaitAckAfterSend => {
                self.state = State::CheckReceivedAck;
                Reaction::ReadAck
            }
            State::CheckReceivedAck => {
                if data & 1 != 0 {
                    // NACK, the master is done reading
                    self.state = State::AwaitAddress;
                    Reaction::Release
                } else {
                    self.send_next()
                }
            }
            State::ReceiveDataByte => {
                self.state = State::StoreByteAndAck;
                Reaction::ReadByte
            }
            State::StoreByteAndAck => {
                if self.rx.push(data).is_ok() {
                    self.received += 1;
                }
                self.state = State::ReceiveDataByte;
                Reaction::SendAck
            }
        }
    }

    pub fn on_stop<H: SlaveHandler>(&mut self, handler: &mut H) {
        self.state = State::AwaitAddress;
        self.deliver(handler);
    }

    fn deliver<H: SlaveHandler>(&mut self, handler: &mut H) {
        let count = core::mem::take(&mut self.received);
        if count > 0 {
            handler.on_receive(count, &mut self.rx);
        }
    }

    fn send_next(&mut self) -> Reaction {
        let byte = self.tx.pop().unwrap_or(FILLER_BYTE);
        self.state = State::AwaitAckAfterSend;
        Reaction::SendByte(byte)
    }
}

struct Inner<H, const RX: usize, const TX: usize> {
    engine: Engine<RX, TX>,
    handler: H,
}

/// Interrupt-safe slave driver, meant to live in a `static`.
pub struct SlaveDriver<H, const RX: usize = 32, const TX: usize = 32> {
    inner: Mutex<RefCell<Inner<H, RX, TX>>>,
}

impl<H: SlaveHandler, const RX: usize, const TX: usize> SlaveDriver<H, RX, TX> {
    pub const fn new(address: u8, handler: H) -> Self {
        SlaveDriver {
            inner: Mutex::new(RefCell::new(Inner {
                engine: Engine::new(address),
                handler,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<H, RX, TX>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Start condition interrupt.
    pub fn start_condition(&self) -> Reaction {
        self.with(|inner| {
            let Inner { engine, handler } = inner;
            engine.on_start(handler)
        })
    }

    /// Counter overflow interrupt, `data` is the shift register content.
    pub fn overflow(&self, data: u8) -> Reaction {
        self.with(|inner| {
            let Inner { engine, handler } = inner;
            engine.on_overflow(data, handler)
        })
    }

    /// Stop condition, as flagged by the hardware.
    pub fn stop_condition(&self) {
        self.with(|inner| {
            let Inner { engine, handler } = inner;
            engine.on_stop(handler)
        })
    }

    /// Received bytes not read yet.
    pub fn available(&self) -> usize {
        self.with(|inner| inner.engine.rx.len())
    }

    pub fn read(&self) -> Option<u8> {
        self.with(|inner| inner.engine.rx.pop())
    }

    /// Queue a byte for the next read by the master, handing it back when the buffer is full.
    pub fn queue(&self, byte: u8) -> Result<(), u8> {
        self.with(|inner| inner.engine.tx.push(byte))
    }

    pub fn state(&self) -> State {
        self.with(|inner| inner.engine.state())
    }

    /// Received bytes lost because the receive buffer was full.
    pub fn overflow_count(&self) -> usize {
        self.with(|inner| inner.engine.rx.dropped())
    }

    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.with(|inner| f(&mut inner.handler))
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    const ADDR: u8 = 10;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<Vec<u8>>,
        requests: usize,
        /// Writes already delivered when each read began.
        writes_before_request: Vec<usize>,
        reply: Vec<u8>,
    }

    impl SlaveHandler for Recorder {
        fn on_receive<const N: usize>(&mut self, count: usize, rx: &mut RingBuffer<N>) {
            let bytes = (0..count).filter_map(|_| rx.pop()).collect();
            self.writes.push(bytes);
        }

        fn on_request<const N: usize>(&mut self, tx: &mut RingBuffer<N>) {
            self.requests += 1;
            self.writes_before_request.push(self.writes.len());
            for &byte in &self.reply {
                let _ = tx.push(byte);
            }
        }
    }

    /// Start, address and data bytes, leaving the bus held.
    fn write_no_stop<H: SlaveHandler, const RX: usize, const TX: usize>(
        driver: &SlaveDriver<H, RX, TX>,
        address: u8,
        bytes: &[u8],
    ) {
        driver.start_condition();
        assert_eq!(driver.overflow(address << 1), Reaction::SendAck);
        for &byte in bytes {
            driver.overflow(0); // ack sent
            assert_eq!(driver.state(), State::StoreByteAndAck);
            assert_eq!(driver.overflow(byte), Reaction::SendAck);
        }
    }

    fn write<H: SlaveHandler, const RX: usize, const TX: usize>(
        driver: &SlaveDriver<H, RX, TX>,
        address: u8,
        bytes: &[u8],
    ) {
        write_no_stop(driver, address, bytes);
        driver.stop_condition();
    }

    /// Reads `n` bytes, acking all but the last.
    fn read<H: SlaveHandler, const RX: usize, const TX: usize>(
        driver: &SlaveDriver<H, RX, TX>,
        n: usize,
    ) -> Vec<u8> {
        driver.start_condition();
        assert_eq!(driver.overflow(ADDR << 1 | 1), Reaction::SendAck);
        let mut out = Vec::new();
        for _ in 0..n {
            let Reaction::SendByte(byte) = driver.overflow(0) else {
                panic!("expected a byte to send");
            };
            out.push(byte);
            assert_eq!(driver.overflow(0), Reaction::ReadAck);
            assert_eq!(driver.state(), State::CheckReceivedAck);
        }
        assert_eq!(driver.overflow(1), Reaction::Release);
        driver.stop_condition();
        out
    }

    #[test]
    fn repeated_start_delivers_the_write_before_the_read() {
        let driver = SlaveDriver::<_, 4, 4>::new(
            ADDR,
            Recorder {
                reply: vec![0x7d],
                ..Default::default()
            },
        );
        write_no_stop(&driver, ADDR, &[0x82]);
        assert_eq!(read(&driver, 1), vec![0x7d]);
        driver.with_handler(|h| {
            assert_eq!(h.writes, vec![vec![0x82]]);
            assert_eq!(h.writes_before_request, vec![1]);
        });
    }

    #[test]
    fn full_sized_write_is_reported_whole() {
        let driver = SlaveDriver::<_, 256, 4>::new(ADDR, Recorder::default());
        let bytes: Vec<u8> = (0..=255).collect();
        write(&driver, ADDR, &bytes);
        assert_eq!(driver.overflow_count(), 0);
        driver.with_handler(|h| assert_eq!(h.writes, vec![bytes.clone()]));
        assert_eq!(driver.available(), 0);
    }

    #[test]
    fn write_reports_bytes_on_stop() {
        let driver = SlaveDriver::<_, 4, 4>::new(ADDR, Recorder::default());
        write(&driver, ADDR, &[0x81]);
        write(&driver, ADDR, &[1, 2, 3]);
        assert_eq!(driver.state(), State::AwaitAddress);
        driver.with_handler(|h| assert_eq!(h.writes, vec![vec![0x81], vec![1, 2, 3]]));
        assert_eq!(driver.available(), 0);
    }

    #[test]
    fn bytes_stay_buffered_without_a_consumer() {
        let driver = SlaveDriver::<(), 4, 4>::new(ADDR, ());
        write(&driver, ADDR, &[5, 6]);
        assert_eq!(driver.available(), 2);
        assert_eq!(driver.read(), Some(5));
        assert_eq!(driver.read(), Some(6));
        assert_eq!(driver.read(), None);
    }

    #[test]
    fn full_receive_buffer_drops_and_counts() {
        let driver = SlaveDriver::<(), 4, 4>::new(ADDR, ());
        write(&driver, ADDR, &[0, 1, 2, 3, 4, 5]);
        assert_eq!(driver.available(), 4);
        assert_eq!(driver.overflow_count(), 2);
        assert_eq!(driver.read(), Some(0));
    }

    #[test]
    fn read_sends_queue_then_filler() {
        let driver = SlaveDriver::<_, 4, 4>::new(
            ADDR,
            Recorder {
                reply: vec![0x7e],
                ..Default::default()
            },
        );
        assert_eq!(read(&driver, 2), vec![0x7e, FILLER_BYTE]);
        driver.with_handler(|h| assert_eq!(h.requests, 1));
        assert_eq!(driver.state(), State::AwaitAddress);
    }

    #[test]
    fn application_queue_is_bounded() {
        let driver = SlaveDriver::<(), 4, 4>::new(ADDR, ());
        for byte in 0..4 {
            driver.queue(byte).unwrap();
        }
        assert_eq!(driver.queue(9), Err(9));
        assert_eq!(read(&driver, 1), vec![0]);
    }

    #[test]
    fn other_addresses_are_released() {
        let driver = SlaveDriver::<_, 4, 4>::new(ADDR, Recorder::default());
        driver.start_condition();
        assert_eq!(driver.overflow(11 << 1), Reaction::Release);
        assert_eq!(driver.overflow(42), Reaction::Release);
        assert_eq!(driver.state(), State::AwaitAddress);
        driver.stop_condition();
        driver.with_handler(|h| assert!(h.writes.is_empty()));
    }

    #[test]
    fn general_call_is_accepted() {
        let driver = SlaveDriver::<(), 4, 4>::new(ADDR, ());
        write(&driver, 0, &[0x55]);
        assert_eq!(driver.read(), Some(0x55));
    }

    #[test]
    fn start_aborts_any_transfer() {
        let driver = SlaveDriver::<(), 4, 4>::new(ADDR, ());
        driver.start_condition();
        driver.overflow(ADDR << 1 | 1);
        driver.overflow(0);
        assert_eq!(driver.state(), State::AwaitAckAfterSend);
        assert_eq!(driver.start_condition(), Reaction::ReadByte);
        assert_eq!(driver.state(), State::AwaitAddress);
    }

    #[test]
    fn random_bus_glitches_keep_buffers_bounded() {
        let mut rng = StdRng::seed_from_u64(0x7105);
        let driver = SlaveDriver::<(), 4, 4>::new(ADDR, ());
        for _ in 0..10_000 {
            match rng.random_range(0..10) {
                0 => {
                    driver.start_condition();
                    assert_eq!(driver.state(), State::AwaitAddress);
                }
                1 => {
                    driver.stop_condition();
                    assert_eq!(driver.state(), State::AwaitAddress);
                }
                2 => {
                    let _ = driver.queue(rng.random::<u8>());
                }
                3 => {
                    let _ = driver.read();
                }
                _ => {
                    driver.overflow(rng.random::<u8>());
                }
            }
            assert!(driver.available() <= 4);
        }
    }
}
