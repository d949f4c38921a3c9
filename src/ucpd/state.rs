//! Handle lifecycle state and the atomic transition guard.

use core::sync::atomic::{AtomicU16, Ordering};

use super::Error;

/// Lifecycle and activity state of a UCPD handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PdState {
    /// Powered down, nothing programmed.
    Reset = 0,
    /// Clock enabled and peripheral out of reset, not yet configured.
    Init = 1,
    /// Configuration applied, transceiver not started.
    Configured = 2,
    /// Operational, no transfer in flight.
    Idle = 3,
    /// Transmit framing and DMA programmed, transmission not yet started.
    TxArmed = 4,
    /// Transmission in progress.
    TxActive = 5,
    /// Reception in progress.
    RxActive = 6,
}

impl PdState {
    pub(crate) const fn from_bits(bits: u8) -> Option<PdState> {
        match bits {
            0 => Some(PdState::Reset),
            1 => Some(PdState::Init),
            2 => Some(PdState::Configured),
            3 => Some(PdState::Idle),
            4 => Some(PdState::TxArmed),
            5 => Some(PdState::TxActive),
            6 => Some(PdState::RxActive),
            _ => None,
        }
    }

    /// Bit for use in an allowed-set mask.
    pub(crate) const fn mask(self) -> u8 {
        1 << self as u8
    }
}

/// {current, previous} state pair packed into one atomic word.
///
/// Packing both halves lets a single compare-and-swap move the machine
/// forward and record where it came from, so neither an interrupt nor a
/// second thread can ever observe the pair mid-update.
pub(crate) struct StateCell(AtomicU16);

const fn pack(current: PdState, previous: PdState) -> u16 {
    current as u16 | (previous as u16) << 8
}

fn unpack_current(packed: u16) -> PdState {
    // Only `pack` output is ever stored, so the byte is always a declared
    // value. Reset is a harmless fallback that keeps this total.
    PdState::from_bits((packed & 0xff) as u8).unwrap_or(PdState::Reset)
}

fn unpack_previous(packed: u16) -> PdState {
    PdState::from_bits((packed >> 8) as u8).unwrap_or(PdState::Reset)
}

impl StateCell {
    pub const fn new() -> Self {
        Self(AtomicU16::new(pack(PdState::Reset, PdState::Reset)))
    }

    pub fn current(&self) -> PdState {
        unpack_current(self.0.load(Ordering::Acquire))
    }

    pub fn previous(&self) -> PdState {
        unpack_previous(self.0.load(Ordering::Acquire))
    }

    /// Atomically move to `new` if the current state is in `allowed_mask`.
    ///
    /// Returns the state the cell held before the transition. `Busy` means
    /// the operation is not legal right now, nothing was modified, and the
    /// caller must not spin on it from interrupt context.
    pub fn try_transition(&self, allowed_mask: u8, new: PdState) -> Result<PdState, Error> {
        let mut packed = self.0.load(Ordering::Acquire);
        loop {
            let current = unpack_current(packed);
            if allowed_mask & current.mask() == 0 {
                return Err(Error::Busy);
            }
            match self.0.compare_exchange_weak(
                packed,
                pack(new, current),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(observed) => packed = observed,
            }
        }
    }

    /// Check membership without transitioning.
    ///
    /// Guards register-programming calls that must be state-legal but do
    /// not themselves change the machine.
    pub fn check(&self, allowed_mask: u8) -> Result<PdState, Error> {
        let current = self.current();
        if allowed_mask & current.mask() == 0 {
            return Err(Error::Busy);
        }
        Ok(current)
    }

    /// Unconditional transition, recording the displaced state as previous.
    ///
    /// Only for teardown paths that must succeed from any state.
    pub fn force(&self, new: PdState) {
        let mut packed = self.0.load(Ordering::Acquire);
        loop {
            let next = pack(new, unpack_current(packed));
            match self
                .0
                .compare_exchange_weak(packed, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(observed) => packed = observed,
            }
        }
    }

    #[cfg(test)]
    pub fn raw(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_records_previous() {
        let cell = StateCell::new();
        assert_eq!(cell.current(), PdState::Reset);

        let prior = cell
            .try_transition(PdState::Reset.mask(), PdState::Init)
            .unwrap();
        assert_eq!(prior, PdState::Reset);
        assert_eq!(cell.current(), PdState::Init);
        assert_eq!(cell.previous(), PdState::Reset);

        let prior = cell
            .try_transition(PdState::Init.mask() | PdState::Configured.mask(), PdState::Configured)
            .unwrap();
        assert_eq!(prior, PdState::Init);
        assert_eq!(cell.previous(), PdState::Init);
    }

    #[test]
    fn disallowed_transition_is_busy_and_leaves_state_alone() {
        let cell = StateCell::new();
        cell.force(PdState::TxActive);

        let err = cell.try_transition(PdState::Idle.mask(), PdState::TxArmed);
        assert_eq!(err, Err(Error::Busy));
        assert_eq!(cell.current(), PdState::TxActive);
    }

    #[test]
    fn check_does_not_transition() {
        let cell = StateCell::new();
        cell.force(PdState::Idle);

        assert_eq!(cell.check(PdState::Idle.mask()), Ok(PdState::Idle));
        assert_eq!(cell.current(), PdState::Idle);
        assert_eq!(cell.check(PdState::TxActive.mask()), Err(Error::Busy));
    }

    #[test]
    fn concurrent_transitions_never_tear() {
        let cell = StateCell::new();
        cell.force(PdState::Idle);

        std::thread::scope(|scope| {
            for seed in 0..2u8 {
                let cell = &cell;
                scope.spawn(move || {
                    let target = if seed == 0 {
                        PdState::TxActive
                    } else {
                        PdState::RxActive
                    };
                    for _ in 0..50_000 {
                        if let Ok(prior) = cell.try_transition(PdState::Idle.mask(), target) {
                            // Winner holds the claim exclusively.
                            assert_eq!(prior, PdState::Idle);
                            let released = cell.try_transition(target.mask(), PdState::Idle);
                            assert_eq!(released, Ok(target));
                        }

                        let packed = cell.raw();
                        assert!(PdState::from_bits((packed & 0xff) as u8).is_some());
                        assert!(PdState::from_bits((packed >> 8) as u8).is_some());
                    }
                });
            }
        });

        assert_eq!(cell.current(), PdState::Idle);
    }
}
