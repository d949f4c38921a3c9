//! UCPD, USB Type-C / Power Delivery transceiver
//!
//! - One driver handle per instance, all completion paths driven by the
//!   single peripheral interrupt through [`InterruptHandler`]
//! - Completions, wire events and faults are delivered to a registered
//!   [`PdEventHandler`] from interrupt context

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;
use core::sync::atomic::{compiler_fence, AtomicBool, AtomicU8, Ordering};

use aligned::{Aligned, A4};
use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use crate::pac::{self, CFG, CR, RX_ORDSET, RX_PAYSZ, SR, TX_GOODCRC, TX_ORDSET, TX_PAYSZ};
use crate::ucpd::state::StateCell;
use crate::{interrupt, into_ref, peripherals, rcc, Peripheral, PeripheralRef};

pub mod ordset;
pub mod protocol;
mod state;

pub use ordset::OrderedSet;
pub use state::PdState;

/// All fifteen event bits of the mask/status/clear registers.
const EVENT_MASK: u32 = 0x7fff;

/// Nine defined ordered-set filter bits.
const ORDSET_FILTER_MASK: u16 = 0x01ff;

/// BMC half-bit rate for the 300 kbps wire encoding.
const BMC_HALF_BIT_HZ: u32 = 600_000;

/// Highest ucpd_clk the analog front end is specified for.
const UCPD_CLK_MAX_HZ: u32 = 16_000_000;

/// Receiver transition window, in half-bit clocks.
const TRANSWIN_HALF_BITS: u32 = 9;

/// Interframe gap, in ucpd_clk cycles.
const IFRGAP_CYCLES: u32 = 17;

const TX_BUFFER_BYTES: usize = MaxPayload::Unchunked as usize;

const BUS_POLL_STEP: MicrosDurationU32 = MicrosDurationU32::from_ticks(10);

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The operation is not legal in the current handle state.
    Busy,
    /// Parameters are inconsistent or out of range.
    InvalidConfig,
}

/// Accumulated asynchronous fault flags.
///
/// Cleared when a new transfer starts, reported through
/// [`PdEventHandler::on_error`] as faults land.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    pub const NONE: ErrorFlags = ErrorFlags(0);
    /// Receiver coding or framing error.
    pub const RX_ERR: ErrorFlags = ErrorFlags(1 << 0);
    /// Receive overrun, the DMA engine fell behind the wire.
    pub const RX_OVR: ErrorFlags = ErrorFlags(1 << 1);
    /// Transmit underrun, the DMA engine starved the framer.
    pub const TX_UND: ErrorFlags = ErrorFlags(1 << 2);
    /// Bus fault during an active DMA transfer.
    pub const DMA_ERR: ErrorFlags = ErrorFlags(1 << 3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: ErrorFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ErrorFlags {
    type Output = ErrorFlags;
    fn bitor(self, rhs: ErrorFlags) -> ErrorFlags {
        ErrorFlags(self.0 | rhs.0)
    }
}

impl core::fmt::Debug for ErrorFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for (flag, name) in [
            (ErrorFlags::RX_ERR, "RX_ERR"),
            (ErrorFlags::RX_OVR, "RX_OVR"),
            (ErrorFlags::TX_UND, "TX_UND"),
            (ErrorFlags::DMA_ERR, "DMA_ERR"),
        ] {
            if self.contains(flag) {
                list.entry(&name);
            }
        }
        list.finish()
    }
}

/// Power role presented on the CC lines.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Source = 0,
    Sink = 1,
}

/// Rp current advertisement while acting as source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rp {
    /// Default USB current.
    Default = 0,
    /// 1.5 A advertisement.
    Rp1P5 = 1,
    /// 3.0 A advertisement.
    Rp3P0 = 2,
}

/// One CC line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcLine {
    Cc1 = 0,
    Cc2 = 1,
}

/// CC line detector enables.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcLines {
    Neither = 0,
    Cc1 = 1,
    Cc2 = 2,
    Both = 3,
}

/// Voltage classification of one CC line. Which bands apply depends on
/// the analog role at the time of the reading.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcVState {
    /// Source: Ra detected.
    SourceRa,
    /// Source: Rd detected, a sink is attached.
    SourceRd,
    /// Source: line open, nothing attached.
    SourceOpen,
    /// Source: reading outside every defined band.
    SourceInvalid,
    /// Sink: line near ground, no Rp present.
    SinkRa,
    /// Sink: default USB Rp advertisement.
    SinkRpDefault,
    /// Sink: 1.5 A Rp advertisement.
    SinkRp1P5,
    /// Sink: 3.0 A Rp advertisement.
    SinkRp3P0,
}

/// Largest message the receiver must be prepared to hold.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum MaxPayload {
    /// Chunked extended messages only.
    Chunked = 30,
    /// Unchunked extended messages negotiated.
    Unchunked = 264,
}

impl MaxPayload {
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// What the next transmission puts on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxMode {
    /// Ordered set, payload, CRC and EOP framed as one message.
    Normal,
    /// Cable Reset sequence, no payload.
    CableReset,
    /// Hard Reset sequence, no payload.
    HardReset,
    /// Continuous BIST carrier, terminated by [`Ucpd::abort`].
    BistCarrier,
}

#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// Receiver ordered-set filter, bits from [`OrderedSet::mask`].
    pub rx_ordered_sets: u16,
    /// Receive size ceiling, also the transmit payload limit.
    pub max_payload: MaxPayload,
    /// Reply GoodCRC in hardware to correctly received messages.
    pub auto_good_crc: bool,
    /// Header template for the hardware GoodCRC reply. The message ID is
    /// echoed from the received message, the rest comes from here.
    pub good_crc_header: protocol::Header,
}

impl Default for Config {
    /// Sink defaults: all standard ordered sets accepted, chunked sizes,
    /// hardware GoodCRC enabled.
    fn default() -> Self {
        Self {
            rx_ordered_sets: OrderedSet::Sop.mask()
                | OrderedSet::SopPrime.mask()
                | OrderedSet::SopDoublePrime.mask()
                | OrderedSet::HardReset.mask()
                | OrderedSet::CableReset.mask(),
            max_payload: MaxPayload::Chunked,
            auto_good_crc: true,
            good_crc_header: protocol::Header::good_crc_template(protocol::SPEC_REV_2_0, false, false),
        }
    }
}

/// Callback sink for everything the interrupt handler resolves.
///
/// All methods run in interrupt context and must return quickly. The
/// default body of every method drops the event.
pub trait PdEventHandler: Sync {
    /// Message fully sent, GoodCRC not yet considered.
    fn on_tx_complete(&self) {}
    /// Transmission discarded because the wire was busy.
    fn on_tx_discarded(&self) {}
    /// Transmission stopped by [`Ucpd::abort`].
    fn on_tx_aborted(&self) {}
    /// Message landed in the receive buffer. `len` bytes are valid.
    fn on_rx_complete(&self, buffer: &'static mut [u8], len: usize) {
        let _ = (buffer, len);
    }
    /// Ordered set seen on the wire. `None` for an enabled sequence the
    /// driver does not recognize.
    fn on_ordered_set_detected(&self, set: Option<OrderedSet>) {
        let _ = set;
    }
    /// Hard Reset signaling sent.
    fn on_hard_reset_sent(&self) {}
    /// Hard Reset transmission discarded.
    fn on_hard_reset_discarded(&self) {}
    /// Hard Reset received. Carries the receive buffer if a reception
    /// was in flight when the reset ended it.
    fn on_hard_reset_received(&self, reclaimed: Option<&'static mut [u8]>) {
        let _ = reclaimed;
    }
    /// Voltage change on a CC line.
    fn on_typec_event(&self, line: CcLine, vstate: CcVState) {
        let _ = (line, vstate);
    }
    /// Fast Role Swap signaling detected.
    fn on_frs_detected(&self) {}
    /// Asynchronous fault. Carries the receive buffer if the fault
    /// abandoned an active reception.
    fn on_error(&self, flags: ErrorFlags, reclaimed: Option<&'static mut [u8]>) {
        let _ = (flags, reclaimed);
    }
}

/// Sink for events that fire before registration or after teardown.
struct NoHandler;

impl PdEventHandler for NoHandler {}

const NO_HANDLER: &dyn PdEventHandler = &NoHandler;

/// Shared per-instance state, reachable from both the driver handle and
/// the interrupt handler.
pub(crate) struct State {
    pd: StateCell,
    errors: AtomicU8,
    handler: Mutex<Cell<&'static dyn PdEventHandler>>,
    handler_set: AtomicBool,
    rx_buf: Mutex<Cell<Option<&'static mut [u8]>>>,
    bus_claimed: AtomicBool,
    tx_buf: UnsafeCell<Aligned<A4, [u8; TX_BUFFER_BYTES]>>,
}

// The staging buffer is the only unsynchronized field. It is written only
// by the thread holding the TxArmed claim and read only by the transmit
// DMA engine after the fence in `transmit`.
unsafe impl Sync for State {}

impl State {
    const fn new() -> Self {
        Self {
            pd: StateCell::new(),
            errors: AtomicU8::new(0),
            handler: Mutex::new(Cell::new(NO_HANDLER)),
            handler_set: AtomicBool::new(false),
            rx_buf: Mutex::new(Cell::new(None)),
            bus_claimed: AtomicBool::new(false),
            tx_buf: UnsafeCell::new(Aligned([0; TX_BUFFER_BYTES])),
        }
    }
}

/// UCPD driver.
///
/// Owns one transceiver instance from `new` until drop. Synchronous
/// calls return [`Error::Busy`] instead of blocking when the handle
/// state does not permit them; transfer completion arrives through the
/// registered [`PdEventHandler`].
pub struct Ucpd<'d, T: Instance> {
    _peri: PeripheralRef<'d, T>,
    config: Config,
}

impl<'d, T: Instance> Ucpd<'d, T> {
    /// Take the peripheral out of reset, leaving it unconfigured and
    /// quiet.
    ///
    /// Wire [`InterruptHandler`] into the vector table entry for
    /// [`Instance::Interrupt`] before starting the transceiver.
    pub fn new(peri: impl Peripheral<P = T> + 'd) -> Self {
        into_ref!(peri);
        T::enable_and_reset();
        quiesce(T::regs(), T::state());
        T::state().pd.force(PdState::Init);
        trace!("ucpd: init");

        Self {
            _peri: peri,
            config: Config::default(),
        }
    }

    /// Register the event callback sink.
    ///
    /// Accepted once per handle lifetime, before the transceiver starts.
    /// Events that fire with no handler registered are dropped.
    pub fn set_event_handler(&mut self, handler: &'static dyn PdEventHandler) -> Result<(), Error> {
        let state = T::state();
        state
            .pd
            .check(PdState::Init.mask() | PdState::Configured.mask())?;
        if state.handler_set.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidConfig);
        }
        critical_section::with(|cs| state.handler.borrow(cs).set(handler));
        Ok(())
    }

    /// Program clocking, the receive filter and the GoodCRC engine.
    ///
    /// Legal before the first start and between [`stop`](Self::stop) and
    /// the next [`start`](Self::start). The peripheral stays disabled
    /// until started.
    pub fn set_config(&mut self, config: Config) -> Result<(), Error> {
        if config.rx_ordered_sets & !ORDSET_FILTER_MASK != 0 {
            return Err(Error::InvalidConfig);
        }

        let hclk = rcc::clocks().hclk.raw();
        let mut psc = 0;
        while (hclk >> psc) > UCPD_CLK_MAX_HZ && psc < 7 {
            psc += 1;
        }
        let ucpd_clk = hclk >> psc;
        if ucpd_clk < BMC_HALF_BIT_HZ {
            return Err(Error::InvalidConfig);
        }
        let half_bit_div = (ucpd_clk / BMC_HALF_BIT_HZ - 1).min(63);

        T::state().pd.try_transition(
            PdState::Init.mask() | PdState::Configured.mask(),
            PdState::Configured,
        )?;

        let regs = T::regs();
        let good_crc = if config.auto_good_crc {
            CFG::GCRCEN::SET
        } else {
            CFG::GCRCEN::CLEAR
        };
        regs.cfg.write(
            CFG::PSC.val(psc)
                + CFG::HBITCLKDIV.val(half_bit_div)
                + CFG::TRANSWIN.val(TRANSWIN_HALF_BITS)
                + CFG::IFRGAP.val(IFRGAP_CYCLES)
                + CFG::ORDSETEN.val(config.rx_ordered_sets as u32)
                + good_crc,
        );
        regs.tx_goodcrc
            .write(TX_GOODCRC::HEADER.val(config.good_crc_header.0 as u32));

        self.config = config;
        trace!("ucpd: configured, ucpd_clk={} hz", ucpd_clk);
        Ok(())
    }

    /// Enable the transceiver and unmask its events.
    pub fn start(&mut self) -> Result<(), Error> {
        let state = T::state();
        state
            .pd
            .try_transition(PdState::Configured.mask(), PdState::Idle)?;
        state.errors.store(0, Ordering::Relaxed);

        let regs = T::regs();
        regs.icr.set(EVENT_MASK);
        regs.cfg.modify(CFG::EN::SET);
        regs.imr.set(EVENT_MASK);
        trace!("ucpd: started");
        Ok(())
    }

    /// Disable the transceiver. Fails while a transfer is in flight.
    pub fn stop(&mut self) -> Result<(), Error> {
        let state = T::state();
        state
            .pd
            .try_transition(PdState::Idle.mask(), PdState::Configured)?;

        let regs = T::regs();
        regs.imr.set(0);
        regs.cfg.modify(CFG::EN::CLEAR);
        trace!("ucpd: stopped");
        Ok(())
    }

    /// Reprogram the hardware GoodCRC header template.
    pub fn set_good_crc_header(&mut self, header: protocol::Header) -> Result<(), Error> {
        T::state()
            .pd
            .check(PdState::Configured.mask() | PdState::Idle.mask())?;
        T::regs()
            .tx_goodcrc
            .write(TX_GOODCRC::HEADER.val(header.0 as u32));
        self.config.good_crc_header = header;
        Ok(())
    }

    /// Active configuration.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Stage `payload` and start putting it on the wire.
    ///
    /// Returns as soon as the transmission is started; resolution comes
    /// back through exactly one of the transmit callbacks. The payload
    /// is copied out before this returns, hardware CRC and EOP are
    /// appended on the wire.
    pub fn transmit(&mut self, ordered_set: OrderedSet, payload: &[u8], mode: TxMode) -> Result<(), Error> {
        match mode {
            TxMode::Normal => {
                if ordered_set.is_reset()
                    || payload.len() < protocol::HEADER_BYTES
                    || payload.len() > self.config.max_payload.bytes()
                {
                    return Err(Error::InvalidConfig);
                }
            }
            TxMode::CableReset => {
                if ordered_set != OrderedSet::CableReset || !payload.is_empty() {
                    return Err(Error::InvalidConfig);
                }
            }
            TxMode::HardReset => {
                if ordered_set != OrderedSet::HardReset || !payload.is_empty() {
                    return Err(Error::InvalidConfig);
                }
            }
            TxMode::BistCarrier => {
                if !payload.is_empty() {
                    return Err(Error::InvalidConfig);
                }
            }
        }

        let state = T::state();
        state
            .pd
            .try_transition(PdState::Idle.mask(), PdState::TxArmed)?;
        state.errors.store(0, Ordering::Relaxed);

        let regs = T::regs();
        if mode == TxMode::Normal {
            // Exclusive access: this thread holds the TxArmed claim and
            // the interrupt handler never touches the staging buffer.
            let staging = unsafe { &mut *state.tx_buf.get() };
            staging[..payload.len()].copy_from_slice(payload);
            compiler_fence(Ordering::SeqCst);

            regs.tx_ordset
                .write(TX_ORDSET::TXORDSET.val(ordered_set.bits()));
            regs.tx_paysz
                .write(TX_PAYSZ::TXPAYSZ.val(payload.len() as u32));
            regs.txdma_addr.set(staging.as_ptr() as u32);
            regs.cfg.modify(CFG::TXDMAEN::SET);
        }

        // Cannot fail, the claim above is exclusive and the interrupt
        // handler never resolves TxArmed.
        state
            .pd
            .try_transition(PdState::TxArmed.mask(), PdState::TxActive)?;

        match mode {
            TxMode::Normal => {
                trace!("ucpd: tx {} bytes", payload.len());
                regs.cr.modify(CR::TXMODE::Message + CR::TXSEND::SET);
            }
            TxMode::CableReset => {
                trace!("ucpd: tx cable reset");
                regs.cr.modify(CR::TXMODE::CableReset + CR::TXSEND::SET);
            }
            TxMode::HardReset => {
                trace!("ucpd: tx hard reset");
                regs.cr.modify(CR::TXMODE::Message + CR::TXHRST::SET);
            }
            TxMode::BistCarrier => {
                trace!("ucpd: tx bist carrier");
                regs.cr.modify(CR::TXMODE::BistCarrier + CR::TXSEND::SET);
            }
        }
        Ok(())
    }

    /// Arm a reception into `buffer`.
    ///
    /// The buffer must hold the configured maximum message. Ownership
    /// moves to the driver until a completion, fault or hard reset hands
    /// it back through the event handler, or [`abort`](Self::abort)
    /// returns it synchronously.
    pub fn start_receive(&mut self, buffer: &'static mut [u8]) -> Result<(), Error> {
        if buffer.len() < self.config.max_payload.bytes() {
            return Err(Error::InvalidConfig);
        }

        let state = T::state();
        state
            .pd
            .try_transition(PdState::Idle.mask(), PdState::RxActive)?;
        state.errors.store(0, Ordering::Relaxed);

        let regs = T::regs();
        let addr = buffer.as_ptr() as u32;
        let capacity = buffer.len() as u32;
        critical_section::with(|cs| state.rx_buf.borrow(cs).replace(Some(buffer)));
        regs.rxdma_addr.set(addr);
        regs.rxdma_sz.set(capacity);
        regs.cfg.modify(CFG::RXDMAEN::SET);
        compiler_fence(Ordering::SeqCst);
        regs.cr.modify(CR::RXEN::SET);
        trace!("ucpd: rx armed, {} byte buffer", capacity);
        Ok(())
    }

    /// Abort the transfer in flight.
    ///
    /// A transmission is stopped asynchronously: `Ok(None)` now, then
    /// [`PdEventHandler::on_tx_aborted`] once the framer has let go of
    /// the wire. A reception is disarmed on the spot and its buffer
    /// handed back. `Busy` when nothing is in flight.
    pub fn abort(&mut self) -> Result<Option<&'static mut [u8]>, Error> {
        let state = T::state();
        let regs = T::regs();

        if state.pd.check(PdState::TxActive.mask()).is_ok() {
            regs.cr.modify(CR::TXABORT::SET);
            return Ok(None);
        }

        state
            .pd
            .try_transition(PdState::RxActive.mask(), PdState::Idle)?;
        disarm_rx(regs);
        compiler_fence(Ordering::SeqCst);
        Ok(take_rx_buffer(state))
    }

    /// Set the analog role of both CC PHYs.
    pub fn set_role(&mut self, role: Role) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(match role {
            Role::Source => CR::ANAMODE::Source,
            Role::Sink => CR::ANAMODE::Sink,
        });
        Ok(())
    }

    /// Set the Rp advertisement used while acting as source.
    pub fn set_rp(&mut self, rp: Rp) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(CR::ANASUBMODE.val(rp as u32));
        Ok(())
    }

    /// Enable the CC line detectors.
    pub fn set_cc_lines(&mut self, lines: CcLines) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(CR::CCENABLE.val(lines as u32));
        Ok(())
    }

    /// Route the PD PHY to the CC line carrying traffic.
    pub fn set_active_cc(&mut self, line: CcLine) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(match line {
            CcLine::Cc1 => CR::PHYCCSEL::Cc1,
            CcLine::Cc2 => CR::PHYCCSEL::Cc2,
        });
        Ok(())
    }

    /// Arm the Fast Role Swap receive detector.
    pub fn enable_frs_rx(&mut self) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(CR::FRSRXEN::SET);
        Ok(())
    }

    pub fn disable_frs_rx(&mut self) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(CR::FRSRXEN::CLEAR);
        Ok(())
    }

    /// Close the Vconn switch on `line`.
    pub fn enable_vconn(&mut self, line: CcLine) -> Result<(), Error> {
        self.role_guard()?;
        T::regs().cr.modify(match line {
            CcLine::Cc1 => CR::VCONNEN1::SET,
            CcLine::Cc2 => CR::VCONNEN2::SET,
        });
        Ok(())
    }

    /// Open both Vconn switches.
    pub fn disable_vconn(&mut self) -> Result<(), Error> {
        self.role_guard()?;
        T::regs()
            .cr
            .modify(CR::VCONNEN1::CLEAR + CR::VCONNEN2::CLEAR);
        Ok(())
    }

    /// Role currently presented on the CC lines.
    pub fn role(&self) -> Role {
        if T::regs().cr.is_set(CR::ANAMODE) {
            Role::Sink
        } else {
            Role::Source
        }
    }

    /// Rp advertisement currently programmed.
    pub fn rp(&self) -> Rp {
        match T::regs().cr.read(CR::ANASUBMODE) {
            0 => Rp::Default,
            1 => Rp::Rp1P5,
            _ => Rp::Rp3P0,
        }
    }

    /// CC line the PD PHY is routed to.
    pub fn active_cc(&self) -> CcLine {
        if T::regs().cr.is_set(CR::PHYCCSEL) {
            CcLine::Cc2
        } else {
            CcLine::Cc1
        }
    }

    /// Classify the voltage on one CC line. Passive, legal in any state.
    pub fn read_voltage_state(&self, line: CcLine) -> CcVState {
        let regs = T::regs();
        let sink = regs.cr.is_set(CR::ANAMODE);
        let bits = match line {
            CcLine::Cc1 => regs.sr.read(SR::TYPEC_VSTATE_CC1),
            CcLine::Cc2 => regs.sr.read(SR::TYPEC_VSTATE_CC2),
        };
        classify(sink, bits)
    }

    /// Current handle state.
    pub fn state(&self) -> PdState {
        T::state().pd.current()
    }

    /// State the handle held before the last transition.
    pub fn previous_state(&self) -> PdState {
        T::state().pd.previous()
    }

    /// Fault flags accumulated since the current or last transfer began.
    pub fn error_flags(&self) -> ErrorFlags {
        ErrorFlags(T::state().errors.load(Ordering::Relaxed))
    }

    /// Claim the advisory bus lock shared by cooperating users of this
    /// instance, polling until `timeout` expires.
    ///
    /// The claim is a convention between callers, transfer calls do not
    /// require it.
    pub fn acquire_bus(
        &mut self,
        delay: &mut impl DelayNs,
        timeout: MicrosDurationU32,
    ) -> Result<(), Error> {
        let state = T::state();
        let mut waited = MicrosDurationU32::from_ticks(0);
        loop {
            if state
                .bus_claimed
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
            if waited >= timeout {
                return Err(Error::Busy);
            }
            delay.delay_us(BUS_POLL_STEP.ticks());
            waited += BUS_POLL_STEP;
        }
    }

    /// Release the advisory bus lock.
    pub fn release_bus(&mut self) {
        T::state().bus_claimed.store(false, Ordering::Release);
    }

    fn role_guard(&self) -> Result<(), Error> {
        T::state()
            .pd
            .check(PdState::Configured.mask() | PdState::Idle.mask())?;
        Ok(())
    }
}

impl<'d, T: Instance> Drop for Ucpd<'d, T> {
    fn drop(&mut self) {
        let state = T::state();
        quiesce(T::regs(), state);
        T::disable();
        state.pd.force(PdState::Reset);
        trace!("ucpd: deinit");
    }
}

/// Silence the hardware and forget everything shared. A receive buffer
/// still held at this point is dropped, not handed back.
fn quiesce(regs: &pac::UcpdRegisters, state: &State) {
    regs.imr.set(0);
    regs.cr.set(0);
    regs.cfg.set(0);
    regs.icr.set(EVENT_MASK);

    critical_section::with(|cs| {
        state.rx_buf.borrow(cs).take();
        state.handler.borrow(cs).set(NO_HANDLER);
    });
    state.handler_set.store(false, Ordering::Relaxed);
    state.errors.store(0, Ordering::Relaxed);
    state.bus_claimed.store(false, Ordering::Relaxed);
}

fn classify(sink: bool, bits: u32) -> CcVState {
    match (sink, bits & 0b11) {
        (false, 0) => CcVState::SourceRa,
        (false, 1) => CcVState::SourceRd,
        (false, 2) => CcVState::SourceOpen,
        (false, _) => CcVState::SourceInvalid,
        (true, 0) => CcVState::SinkRa,
        (true, 1) => CcVState::SinkRpDefault,
        (true, 2) => CcVState::SinkRp1P5,
        (true, _) => CcVState::SinkRp3P0,
    }
}

fn disarm_rx(regs: &pac::UcpdRegisters) {
    regs.cr.modify(CR::RXEN::CLEAR);
    regs.cfg.modify(CFG::RXDMAEN::CLEAR);
}

fn take_rx_buffer(state: &State) -> Option<&'static mut [u8]> {
    critical_section::with(|cs| state.rx_buf.borrow(cs).take())
}

/// Resolve the transmit side to Idle. False when no transmission was
/// active, which keeps stray terminal flags from double-reporting.
fn resolve_tx(regs: &pac::UcpdRegisters, state: &State) -> bool {
    if state
        .pd
        .try_transition(PdState::TxActive.mask(), PdState::Idle)
        .is_ok()
    {
        regs.cfg.modify(CFG::TXDMAEN::CLEAR);
        true
    } else {
        false
    }
}

/// Abandon the active reception with `flag` raised, surfacing the buffer
/// through the error callback.
fn abandon_rx(regs: &pac::UcpdRegisters, state: &State, handler: &dyn PdEventHandler, flag: ErrorFlags) {
    state.errors.fetch_or(flag.0, Ordering::Relaxed);
    let buffer = if state
        .pd
        .try_transition(PdState::RxActive.mask(), PdState::Idle)
        .is_ok()
    {
        disarm_rx(regs);
        compiler_fence(Ordering::SeqCst);
        take_rx_buffer(state)
    } else {
        None
    };
    handler.on_error(ErrorFlags(state.errors.load(Ordering::Relaxed)), buffer);
}

fn on_irq<T: Instance>() {
    let regs = T::regs();
    let state = T::state();

    let sr = regs.sr.extract();
    let active = sr.get() & EVENT_MASK;
    if active == 0 {
        return;
    }
    // Status bits hold until cleared. Clearing only the observed ones
    // keeps anything that lands during dispatch pending for the next run.
    regs.icr.set(active);
    trace!("ucpd irq: sr={:x}", active);

    let handler = critical_section::with(|cs| state.handler.borrow(cs).get());

    if sr.is_set(SR::TYPECEVT1) {
        let vstate = classify(regs.cr.is_set(CR::ANAMODE), sr.read(SR::TYPEC_VSTATE_CC1));
        handler.on_typec_event(CcLine::Cc1, vstate);
    }
    if sr.is_set(SR::TYPECEVT2) {
        let vstate = classify(regs.cr.is_set(CR::ANAMODE), sr.read(SR::TYPEC_VSTATE_CC2));
        handler.on_typec_event(CcLine::Cc2, vstate);
    }
    if sr.is_set(SR::FRSEVT) {
        handler.on_frs_detected();
    }

    // Record non-terminal faults before the resolutions below so their
    // callbacks observe the full flag set.
    let mut async_bits = 0u8;
    if sr.is_set(SR::TXUND) {
        async_bits |= ErrorFlags::TX_UND.0;
    }
    if sr.is_set(SR::DMAERR) {
        async_bits |= ErrorFlags::DMA_ERR.0;
    }
    if async_bits != 0 {
        state.errors.fetch_or(async_bits, Ordering::Relaxed);
    }
    let mut error_reported = false;

    if sr.is_set(SR::RXORDDET) {
        let raw = regs.rx_ordset.read(RX_ORDSET::RXORDSET);
        let set = OrderedSet::decode(raw);
        if set.is_none() {
            trace!("ucpd irq: unknown ordered set {:x}", raw);
        }
        handler.on_ordered_set_detected(set);
    }

    if sr.is_set(SR::RXHRSTDET) {
        let buffer = if state
            .pd
            .try_transition(PdState::RxActive.mask(), PdState::Idle)
            .is_ok()
        {
            disarm_rx(regs);
            compiler_fence(Ordering::SeqCst);
            take_rx_buffer(state)
        } else {
            None
        };
        handler.on_hard_reset_received(buffer);
    }

    if sr.is_set(SR::RXOVR) {
        abandon_rx(regs, state, handler, ErrorFlags::RX_OVR);
        error_reported = true;
    }
    if sr.is_set(SR::RXERR) {
        abandon_rx(regs, state, handler, ErrorFlags::RX_ERR);
        error_reported = true;
    }

    if sr.is_set(SR::RXMSGEND)
        && state
            .pd
            .try_transition(PdState::RxActive.mask(), PdState::Idle)
            .is_ok()
    {
        disarm_rx(regs);
        compiler_fence(Ordering::SeqCst);
        let len = regs.rx_paysz.read(RX_PAYSZ::RXPAYSZ) as usize;
        if let Some(buffer) = take_rx_buffer(state) {
            let len = len.min(buffer.len());
            handler.on_rx_complete(buffer, len);
        }
    }

    if sr.is_set(SR::TXMSGSENT) && resolve_tx(regs, state) {
        handler.on_tx_complete();
    }
    if sr.is_set(SR::TXMSGDISC) && resolve_tx(regs, state) {
        handler.on_tx_discarded();
    }
    if sr.is_set(SR::TXMSGABT) && resolve_tx(regs, state) {
        handler.on_tx_aborted();
    }
    if sr.is_set(SR::HRSTSENT) && resolve_tx(regs, state) {
        handler.on_hard_reset_sent();
    }
    if sr.is_set(SR::HRSTDISC) && resolve_tx(regs, state) {
        handler.on_hard_reset_discarded();
    }

    if async_bits != 0 && !error_reported {
        handler.on_error(ErrorFlags(state.errors.load(Ordering::Relaxed)), None);
    }
}

/// Interrupt handler.
///
/// The single peripheral interrupt drives every completion path. The
/// platform's vector entry for [`Instance::Interrupt`] must call
/// [`interrupt::Handler::on_interrupt`] on this type.
pub struct InterruptHandler<T: Instance> {
    _phantom: PhantomData<T>,
}

impl<T: Instance> interrupt::Handler<T::Interrupt> for InterruptHandler<T> {
    unsafe fn on_interrupt() {
        on_irq::<T>();
    }
}

pub(crate) mod sealed {
    use super::State;
    use crate::pac;

    pub trait Instance {
        fn regs() -> &'static pac::UcpdRegisters;
        fn state() -> &'static State;
        fn enable_and_reset();
        fn disable();
    }
}

/// UCPD peripheral instance.
pub trait Instance: Peripheral<P = Self> + sealed::Instance + 'static {
    /// Interrupt for this peripheral.
    type Interrupt: interrupt::Interrupt;
}

macro_rules! impl_ucpd {
    ($inst:ident, $base:ident, $en:ident, $rst:ident) => {
        impl sealed::Instance for peripherals::$inst {
            #[inline(always)]
            fn regs() -> &'static pac::UcpdRegisters {
                unsafe { &*(pac::$base as *const pac::UcpdRegisters) }
            }

            fn state() -> &'static State {
                static STATE: State = State::new();
                &STATE
            }

            fn enable_and_reset() {
                let rcc = unsafe { &*(pac::RCC_BASE as *const pac::RccRegisters) };
                rcc.ahbenr.modify(pac::AHBENR::$en::SET);
                rcc.ahbrstr.modify(pac::AHBRSTR::$rst::SET);
                rcc.ahbrstr.modify(pac::AHBRSTR::$rst::CLEAR);
            }

            fn disable() {
                let rcc = unsafe { &*(pac::RCC_BASE as *const pac::RccRegisters) };
                rcc.ahbenr.modify(pac::AHBENR::$en::CLEAR);
            }
        }

        impl Instance for peripherals::$inst {
            type Interrupt = crate::interrupt::$inst;
        }
    };
}

impl_ucpd!(UCPD1, UCPD1_BASE, UCPD1EN, UCPD1RST);
impl_ucpd!(UCPD2, UCPD2_BASE, UCPD2EN, UCPD2RST);
