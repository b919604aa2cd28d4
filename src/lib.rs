//! Adaptive userspace touch driver.
//!
//! Reads the raw hidraw byte stream of a multi-touch panel, decodes its
//! proprietary frame format, recognises gestures (click, double click, long
//! click, drag, pinch-to-zoom, two-finger scroll and navigation) and injects
//! the results into the kernel through a pool of virtual input devices.

#![warn(missing_debug_implementations)]
#![forbid(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod daemon;
pub mod decoder;
pub mod device;
pub mod engine;
pub mod formula;
pub mod frame;
pub mod pidfile;
pub mod units;
