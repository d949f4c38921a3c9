use crate::pac::Interrupt as InterruptEnum;

mod sealed {
    pub trait Interrupt {}
}

/// Type-level interrupt.
///
/// This trait is implemented for all typelevel interrupt types in this module.
pub trait Interrupt: sealed::Interrupt {
    /// Interrupt enum variant.
    ///
    /// This allows going from typelevel interrupts (one type per interrupt) to
    /// non-typelevel interrupts (a single `Interrupt` enum type, with one variant per interrupt).
    const IRQ: InterruptEnum;
}

/// Interrupt handler.
///
/// Drivers that service an interrupt implement this trait. The platform's
/// vector table entry for `I` must call `on_interrupt()` every time the
/// interrupt fires.
pub trait Handler<I: Interrupt> {
    /// Interrupt handler function.
    ///
    /// # Safety
    ///
    /// Must only be called from the interrupt handler for `I`.
    unsafe fn on_interrupt();
}

macro_rules! impl_irqs {
    ($($irqs:ident),* $(,)?) => {
        $(
            #[allow(non_camel_case_types)]
            #[doc=stringify!($irqs)]
            #[doc=" typelevel interrupt."]
            pub enum $irqs {}
            impl sealed::Interrupt for $irqs{}
            impl Interrupt for $irqs {
                const IRQ: InterruptEnum = InterruptEnum::$irqs;
            }
        )*
    }
}

impl_irqs!(UCPD1, UCPD2);
