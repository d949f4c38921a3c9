use fugit::HertzU32 as Hertz;

const HSI_FREQUENCY: Hertz = Hertz::from_raw(48_000_000);

// Power on default: HPRE divides HSI down to 8 MHz
const DEFAULT_FREQUENCY: Hertz = Hertz::from_raw(8_000_000);

static mut CLOCKS: Clocks = Clocks {
    // Power on default
    sysclk: DEFAULT_FREQUENCY,
    hclk: DEFAULT_FREQUENCY,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Clocks {
    pub sysclk: Hertz,
    /// Clock of AHB, feeds the UCPD kernel clock.
    pub hclk: Hertz,
}

#[inline]
pub fn clocks() -> &'static Clocks {
    unsafe { &*core::ptr::addr_of!(CLOCKS) }
}

/// Record the clock tree after board init brought it up.
///
/// Divider programming in `set_config` reads these frequencies. Call once
/// from the startup context before constructing drivers.
pub fn init(sysclk: Hertz) {
    unsafe {
        core::ptr::addr_of_mut!(CLOCKS).write(Clocks {
            sysclk,
            hclk: sysclk,
        });
    }
}

/// Record the full-speed internal oscillator without a divider.
#[inline]
pub fn init_hsi() {
    init(HSI_FREQUENCY);
}
