//! Headless device creation.
//!
//! Useful for integration tests, batch rendering and capture without a
//! window.

use pollster::FutureExt;
use strata_render::{RenderResult, WgpuDevice};

/// Creates a wgpu device whose output is an offscreen `width` x `height`
/// target, blocking until the adapter and device are ready.
///
/// # Example
/// ```no_run
/// use strata::*;
///
/// let device = create_headless_device(800, 600).unwrap();
/// assert_eq!(device.viewport_size(), (800, 600));
/// ```
pub fn create_headless_device(width: u32, height: u32) -> RenderResult<WgpuDevice> {
    let device = WgpuDevice::new_headless(width, height).block_on()?;
    log::info!("headless device ready at {width}x{height}");
    Ok(device)
}
