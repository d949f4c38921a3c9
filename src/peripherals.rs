// We need to export this in the hal for the drivers to use

crate::peripherals! {
    UCPD1 <= UCPD1,
    UCPD2 <= UCPD2,
}
