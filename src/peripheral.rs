//! Singleton peripheral ownership.
//!
//! Drivers accept `impl Peripheral<P = T>`, so they can either consume the
//! singleton (`'static` driver) or borrow it with `&mut` for a driver that
//! releases the hardware on drop.

use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// An exclusive reference to a peripheral singleton.
///
/// Functionally the same as a `&'a mut T`, but holds the singleton by value
/// so it stays zero-sized.
pub struct PeripheralRef<'a, T> {
    inner: T,
    _lifetime: PhantomData<&'a mut T>,
}

impl<'a, T> PeripheralRef<'a, T> {
    /// Create a new reference to a peripheral.
    ///
    /// # Safety
    ///
    /// The caller must guarantee `inner` is not aliased by another live
    /// singleton or reference for the duration of `'a`.
    #[inline]
    pub unsafe fn new_unchecked(inner: T) -> Self {
        Self {
            inner,
            _lifetime: PhantomData,
        }
    }

    /// Unsafely duplicate the peripheral singleton.
    ///
    /// # Safety
    ///
    /// Both copies must not be used to control the hardware concurrently.
    #[inline]
    pub unsafe fn clone_unchecked(&self) -> PeripheralRef<'a, T>
    where
        T: Peripheral<P = T>,
    {
        PeripheralRef::new_unchecked(self.inner.clone_unchecked())
    }

    /// Reborrow into a "child" reference with a shorter lifetime.
    ///
    /// The original is inaccessible while the child is alive, exactly like
    /// reborrowing a `&mut`.
    #[inline]
    pub fn reborrow(&mut self) -> PeripheralRef<'_, T>
    where
        T: Peripheral<P = T>,
    {
        // The borrow of self keeps both copies from being used at once.
        unsafe { PeripheralRef::new_unchecked(self.inner.clone_unchecked()) }
    }
}

impl<'a, T> Deref for PeripheralRef<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a, T> DerefMut for PeripheralRef<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A value that can stand in for a peripheral singleton of type `P`.
///
/// Implemented by the singleton itself (consuming it), by `&mut` to it
/// (borrowing it), and by [`PeripheralRef`].
pub trait Peripheral: Sized {
    /// Peripheral singleton type.
    type P;

    /// Unsafely duplicate the peripheral singleton.
    ///
    /// # Safety
    ///
    /// Both copies must not be used to control the hardware concurrently.
    unsafe fn clone_unchecked(&self) -> Self::P;

    /// Convert into a [`PeripheralRef`] bounded by the lifetime of `self`.
    #[inline]
    fn into_ref<'a>(self) -> PeripheralRef<'a, Self::P>
    where
        Self: 'a,
    {
        let p = unsafe { self.clone_unchecked() };
        unsafe { PeripheralRef::new_unchecked(p) }
    }
}

impl<'b, T: Peripheral> Peripheral for &'b mut T {
    type P = T::P;

    #[inline]
    unsafe fn clone_unchecked(&self) -> Self::P {
        T::clone_unchecked(self)
    }
}

impl<'a, T: Peripheral> Peripheral for PeripheralRef<'a, T> {
    type P = T::P;

    #[inline]
    unsafe fn clone_unchecked(&self) -> Self::P {
        self.inner.clone_unchecked()
    }
}

/// Implement [`Peripheral`] for a singleton type.
#[macro_export]
macro_rules! impl_peripheral {
    ($type:ident) => {
        impl $crate::Peripheral for $type {
            type P = $type;

            #[inline]
            unsafe fn clone_unchecked(&self) -> Self::P {
                ::core::ptr::read(self)
            }
        }
    };
}

/// Shadow the named bindings with their [`PeripheralRef`] conversions.
#[macro_export]
macro_rules! into_ref {
    ($($name:ident),*) => {
        $(
            let $name = $name.into_ref();
        )*
    };
}

/// Declare the peripheral singleton types and the `Peripherals` holder.
#[macro_export]
macro_rules! peripherals {
    ($($(#[$cfg:meta])? $name:ident <= $pac_name:tt),* $(,)?) => {
        $(
            $(#[$cfg])?
            #[allow(non_camel_case_types)]
            pub struct $name {
                _private: (),
            }

            $(#[$cfg])?
            impl $name {
                /// Unsafely conjure the singleton out of thin air.
                ///
                /// # Safety
                ///
                /// Only one instance may be used to control the hardware at
                /// a time.
                #[inline]
                pub unsafe fn steal() -> Self {
                    Self { _private: () }
                }
            }

            $(#[$cfg])?
            $crate::impl_peripheral!($name);
        )*

        /// All the peripheral singletons.
        #[allow(non_snake_case)]
        pub struct Peripherals {
            $(
                $(#[$cfg])?
                pub $name: $name,
            )*
        }

        impl Peripherals {
            /// Take the peripherals. Panics on the second call.
            #[inline]
            pub fn take() -> Self {
                static TAKEN: ::core::sync::atomic::AtomicBool =
                    ::core::sync::atomic::AtomicBool::new(false);
                ::critical_section::with(|_| {
                    if TAKEN.swap(true, ::core::sync::atomic::Ordering::Relaxed) {
                        ::core::panic!("peripherals taken more than once");
                    }
                    unsafe { Self::steal() }
                })
            }

            /// Unsafely conjure all singletons out of thin air.
            ///
            /// # Safety
            ///
            /// See [`Peripherals::take`]; stolen copies must not be used
            /// concurrently with previously handed-out singletons.
            #[inline]
            pub unsafe fn steal() -> Self {
                Self {
                    $(
                        $(#[$cfg])?
                        $name: $name::steal(),
                    )*
                }
            }
        }
    };
}
