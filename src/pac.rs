//! Register model for the UCPD transceiver blocks.
//!
//! The layout is self-consistent rather than a bit-exact copy of any one
//! vendor's silicon: one configuration register, one control register, a
//! mask/status/clear interrupt triple, ordered-set and payload-size
//! registers for each direction, the GoodCRC template, and the built-in
//! DMA engine's address/size registers.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

/// Interrupt numbers, one line per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(non_camel_case_types)]
#[repr(u16)]
pub enum Interrupt {
    UCPD1 = 44,
    UCPD2 = 45,
}

register_structs! {
    pub UcpdRegisters {
        /// Global configuration: clock dividers, receiver ordered-set
        /// enables, DMA and GoodCRC enables.
        (0x00 => pub cfg: ReadWrite<u32, CFG::Register>),
        /// Control: transmit mode/start/abort, receiver enable, analog
        /// role configuration, Vconn and FRS switches.
        (0x04 => pub cr: ReadWrite<u32, CR::Register>),
        /// Interrupt mask.
        (0x08 => pub imr: ReadWrite<u32, IMR::Register>),
        /// Status. Event bits hold until cleared through `icr`.
        (0x0c => pub sr: ReadOnly<u32, SR::Register>),
        /// Interrupt clear, write-one-to-clear.
        (0x10 => pub icr: WriteOnly<u32, ICR::Register>),
        /// 20-bit K-code sequence to transmit.
        (0x14 => pub tx_ordset: ReadWrite<u32, TX_ORDSET::Register>),
        /// Transmit payload size in bytes.
        (0x18 => pub tx_paysz: ReadWrite<u32, TX_PAYSZ::Register>),
        /// Header template for the hardware GoodCRC reply.
        (0x1c => pub tx_goodcrc: ReadWrite<u32, TX_GOODCRC::Register>),
        /// Last detected 20-bit K-code sequence.
        (0x20 => pub rx_ordset: ReadOnly<u32, RX_ORDSET::Register>),
        /// Received payload size in bytes, valid once RXMSGEND is set.
        (0x24 => pub rx_paysz: ReadOnly<u32, RX_PAYSZ::Register>),
        /// Transmit DMA read address.
        (0x28 => pub txdma_addr: ReadWrite<u32>),
        /// Receive DMA write address.
        (0x2c => pub rxdma_addr: ReadWrite<u32>),
        /// Receive DMA buffer capacity in bytes.
        (0x30 => pub rxdma_sz: ReadWrite<u32>),
        (0x34 => @END),
    },

    pub RccRegisters {
        /// Peripheral clock enables.
        (0x00 => pub ahbenr: ReadWrite<u32, AHBENR::Register>),
        /// Peripheral resets.
        (0x04 => pub ahbrstr: ReadWrite<u32, AHBRSTR::Register>),
        (0x08 => @END),
    }
}

register_bitfields![u32,
    pub CFG [
        /// Peripheral enable. Must be set before any transfer and kept
        /// clear while reprogramming dividers.
        EN OFFSET(0) NUMBITS(1) [],
        /// Prescaler from kernel clock to ucpd_clk.
        PSC OFFSET(1) NUMBITS(3) [],
        /// Divider from ucpd_clk to the BMC half-bit clock.
        HBITCLKDIV OFFSET(4) NUMBITS(6) [],
        /// Transition window, in half-bit clocks.
        TRANSWIN OFFSET(10) NUMBITS(5) [],
        /// Inter-frame gap, in ucpd_clk cycles.
        IFRGAP OFFSET(15) NUMBITS(5) [],
        /// Receiver ordered-set enable mask, one bit per kind.
        ORDSETEN OFFSET(20) NUMBITS(9) [],
        /// Transmit DMA enable.
        TXDMAEN OFFSET(29) NUMBITS(1) [],
        /// Receive DMA enable.
        RXDMAEN OFFSET(30) NUMBITS(1) [],
        /// Automatic hardware GoodCRC reply enable.
        GCRCEN OFFSET(31) NUMBITS(1) []
    ],

    pub CR [
        /// Transmit mode for the next TXSEND.
        TXMODE OFFSET(0) NUMBITS(2) [
            Message = 0,
            CableReset = 1,
            BistCarrier = 2
        ],
        /// Start transmission, self-clearing.
        TXSEND OFFSET(2) NUMBITS(1) [],
        /// Send a Hard Reset sequence, self-clearing.
        TXHRST OFFSET(3) NUMBITS(1) [],
        /// Abort the transmission in progress, self-clearing.
        TXABORT OFFSET(4) NUMBITS(1) [],
        /// Receiver enable.
        RXEN OFFSET(5) NUMBITS(1) [],
        /// Which CC line the PD PHY uses.
        PHYCCSEL OFFSET(6) NUMBITS(1) [
            Cc1 = 0,
            Cc2 = 1
        ],
        /// Analog role of both CC PHYs.
        ANAMODE OFFSET(7) NUMBITS(1) [
            Source = 0,
            Sink = 1
        ],
        /// Rp advertisement while in source mode.
        ANASUBMODE OFFSET(8) NUMBITS(2) [],
        /// CC line detector enables, bit 0 = CC1, bit 1 = CC2.
        CCENABLE OFFSET(10) NUMBITS(2) [],
        /// Fast Role Swap receive detector enable.
        FRSRXEN OFFSET(12) NUMBITS(1) [],
        /// Vconn switch on CC1.
        VCONNEN1 OFFSET(13) NUMBITS(1) [],
        /// Vconn switch on CC2.
        VCONNEN2 OFFSET(14) NUMBITS(1) []
    ],

    pub IMR [
        TXMSGDISC OFFSET(0) NUMBITS(1) [],
        TXMSGSENT OFFSET(1) NUMBITS(1) [],
        TXMSGABT OFFSET(2) NUMBITS(1) [],
        TXUND OFFSET(3) NUMBITS(1) [],
        HRSTSENT OFFSET(4) NUMBITS(1) [],
        HRSTDISC OFFSET(5) NUMBITS(1) [],
        RXORDDET OFFSET(6) NUMBITS(1) [],
        RXHRSTDET OFFSET(7) NUMBITS(1) [],
        RXOVR OFFSET(8) NUMBITS(1) [],
        RXMSGEND OFFSET(9) NUMBITS(1) [],
        RXERR OFFSET(10) NUMBITS(1) [],
        DMAERR OFFSET(11) NUMBITS(1) [],
        TYPECEVT1 OFFSET(12) NUMBITS(1) [],
        TYPECEVT2 OFFSET(13) NUMBITS(1) [],
        FRSEVT OFFSET(14) NUMBITS(1) []
    ],

    pub SR [
        /// Transmit message discarded (lost arbitration to incoming traffic).
        TXMSGDISC OFFSET(0) NUMBITS(1) [],
        /// Transmit message sent.
        TXMSGSENT OFFSET(1) NUMBITS(1) [],
        /// Transmit message aborted by TXABORT.
        TXMSGABT OFFSET(2) NUMBITS(1) [],
        /// Transmit FIFO underrun.
        TXUND OFFSET(3) NUMBITS(1) [],
        /// Hard Reset sequence sent.
        HRSTSENT OFFSET(4) NUMBITS(1) [],
        /// Hard Reset sequence discarded.
        HRSTDISC OFFSET(5) NUMBITS(1) [],
        /// Ordered set detected on the wire.
        RXORDDET OFFSET(6) NUMBITS(1) [],
        /// Hard Reset received.
        RXHRSTDET OFFSET(7) NUMBITS(1) [],
        /// Receive overrun.
        RXOVR OFFSET(8) NUMBITS(1) [],
        /// End of received message.
        RXMSGEND OFFSET(9) NUMBITS(1) [],
        /// Receive framing/format error.
        RXERR OFFSET(10) NUMBITS(1) [],
        /// DMA bus fault during an active transfer.
        DMAERR OFFSET(11) NUMBITS(1) [],
        /// Voltage level change on CC1.
        TYPECEVT1 OFFSET(12) NUMBITS(1) [],
        /// Voltage level change on CC2.
        TYPECEVT2 OFFSET(13) NUMBITS(1) [],
        /// Fast Role Swap signaling detected.
        FRSEVT OFFSET(14) NUMBITS(1) [],
        /// CC1 voltage classification, meaning depends on ANAMODE.
        TYPEC_VSTATE_CC1 OFFSET(16) NUMBITS(2) [],
        /// CC2 voltage classification, meaning depends on ANAMODE.
        TYPEC_VSTATE_CC2 OFFSET(18) NUMBITS(2) []
    ],

    pub ICR [
        TXMSGDISC OFFSET(0) NUMBITS(1) [],
        TXMSGSENT OFFSET(1) NUMBITS(1) [],
        TXMSGABT OFFSET(2) NUMBITS(1) [],
        TXUND OFFSET(3) NUMBITS(1) [],
        HRSTSENT OFFSET(4) NUMBITS(1) [],
        HRSTDISC OFFSET(5) NUMBITS(1) [],
        RXORDDET OFFSET(6) NUMBITS(1) [],
        RXHRSTDET OFFSET(7) NUMBITS(1) [],
        RXOVR OFFSET(8) NUMBITS(1) [],
        RXMSGEND OFFSET(9) NUMBITS(1) [],
        RXERR OFFSET(10) NUMBITS(1) [],
        DMAERR OFFSET(11) NUMBITS(1) [],
        TYPECEVT1 OFFSET(12) NUMBITS(1) [],
        TYPECEVT2 OFFSET(13) NUMBITS(1) [],
        FRSEVT OFFSET(14) NUMBITS(1) []
    ],

    pub TX_ORDSET [
        TXORDSET OFFSET(0) NUMBITS(20) []
    ],

    pub TX_PAYSZ [
        TXPAYSZ OFFSET(0) NUMBITS(10) []
    ],

    pub TX_GOODCRC [
        HEADER OFFSET(0) NUMBITS(16) []
    ],

    pub RX_ORDSET [
        RXORDSET OFFSET(0) NUMBITS(20) []
    ],

    pub RX_PAYSZ [
        RXPAYSZ OFFSET(0) NUMBITS(10) []
    ],

    pub AHBENR [
        UCPD1EN OFFSET(0) NUMBITS(1) [],
        UCPD2EN OFFSET(1) NUMBITS(1) []
    ],

    pub AHBRSTR [
        UCPD1RST OFFSET(0) NUMBITS(1) [],
        UCPD2RST OFFSET(1) NUMBITS(1) []
    ]
];

pub const UCPD1_BASE: usize = 0x4000_a000;
pub const UCPD2_BASE: usize = 0x4000_a400;
pub const RCC_BASE: usize = 0x4002_1000;
