// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive-access preview fallback
//!
//! When every UDP transport variant is dead, the last resort is opening the
//! loopback device directly with V4L2 mmap streaming. This competes with
//! external consumers for the device, so it is only started after the
//! transport pipeline is fully torn down, and only on explicit request.
//!
//! Loopback devices fed by the streaming helper usually negotiate YUYV;
//! frames are converted to RGB on the CPU before crossing to the session
//! loop.

use super::{FpsCounter, PreviewEvent, PreviewEventSender, PreviewFrame};
use crate::errors::{SessionError, SessionResult};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Fourcc for packed RGB, preferred when the device can provide it
const FOURCC_RGB3: &[u8; 4] = b"RGB3";

/// Fourcc for packed YUYV 4:2:2, the common loopback format
const FOURCC_YUYV: &[u8; 4] = b"YUYV";

/// Convert packed YUYV (Y0 U Y1 V) to RGB using BT.601 coefficients
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    // YUYV: Y0 U Y1 V - each 4-byte group encodes 2 pixels
    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            rgb.push(r);
            rgb.push(g);
            rgb.push(b);

            if rgb.len() >= pixel_count * 3 {
                break;
            }
        }
        if rgb.len() >= pixel_count * 3 {
            break;
        }
    }

    rgb
}

/// Exclusive V4L2 capture loop on the loopback device
pub struct FallbackCapture {
    stop_signal: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl FallbackCapture {
    /// Open `device` and start the capture thread.
    ///
    /// Fails when the device cannot be opened or streaming cannot start;
    /// frame-level errors inside the loop are logged and skipped.
    pub fn start(device: &Path, events: PreviewEventSender) -> SessionResult<Self> {
        let mut dev = Device::with_path(device)
            .map_err(|e| SessionError::Io(format!("open {}: {}", device.display(), e)))?;

        // Ask for RGB; the device answers with what it actually provides
        let mut format = dev
            .format()
            .map_err(|e| SessionError::Io(format!("query format: {}", e)))?;
        format.fourcc = v4l::FourCC::new(FOURCC_RGB3);
        let format = dev
            .set_format(&format)
            .map_err(|e| SessionError::Io(format!("set format: {}", e)))?;

        let fourcc = format.fourcc.repr;
        if &fourcc != FOURCC_RGB3 && &fourcc != FOURCC_YUYV {
            return Err(SessionError::Io(format!(
                "unsupported loopback format {}",
                format.fourcc
            )));
        }

        info!(
            device = ?device,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "Starting exclusive preview capture"
        );

        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let device_label = device.display().to_string();

        let thread_handle = std::thread::spawn(move || {
            let mut stream = match MmapStream::with_buffers(&dev, Type::VideoCapture, 4) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(device = %device_label, error = %e, "Failed to start mmap stream");
                    return;
                }
            };

            let width = format.width;
            let height = format.height;
            let mut fps = FpsCounter::new();
            let mut events = events;

            loop {
                if stop.load(Ordering::SeqCst) {
                    debug!(device = %device_label, "Stop signal received");
                    break;
                }

                let (buf, _meta) = match stream.next() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(device = %device_label, error = %e, "Capture read failed");
                        break;
                    }
                };

                let rgb: Vec<u8> = if &fourcc == FOURCC_YUYV {
                    yuyv_to_rgb(buf, width, height)
                } else {
                    buf.to_vec()
                };

                let frame = PreviewFrame {
                    width,
                    height,
                    data: Arc::from(rgb.into_boxed_slice()),
                };

                // Non-blocking send; a slow consumer just loses frames
                let _ = events.try_send(PreviewEvent::Frame(frame));

                if let Some(rate) = fps.tick() {
                    let _ = events.try_send(PreviewEvent::Fps(rate));
                }
            }

            info!(device = %device_label, "Exclusive preview capture exiting");
        });

        Ok(Self {
            stop_signal,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop the capture thread and close the device
    pub fn stop(mut self) {
        self.stop_now();
    }

    fn stop_now(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FallbackCapture {
    fn drop(&mut self) {
        self.stop_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_conversion_preserves_pixel_count() {
        // 4x2 image: 8 pixels, 16 YUYV bytes in, 24 RGB bytes out
        let yuyv = vec![128u8; 16];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2);
        assert_eq!(rgb.len(), 4 * 2 * 3);
    }

    #[test]
    fn neutral_chroma_gives_grayscale() {
        // Y=200, U=V=128 means zero chroma: R=G=B=200
        let yuyv = [200u8, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);
        assert_eq!(rgb, vec![200, 200, 200, 200, 200, 200]);
    }

    #[test]
    fn full_red_chroma_clamps() {
        // Max V pushes red past 255; it must clamp, not wrap
        let yuyv = [235u8, 128, 235, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);
        assert_eq!(rgb[0], 255);
        assert!(rgb[2] < 235);
    }
}
