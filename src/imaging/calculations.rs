//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Scale `source` down so its width fits `max_width`, preserving aspect ratio.
///
/// Never enlarges: a source narrower than `max_width` is returned unchanged.
/// The height is rounded and never drops below one pixel.
///
/// ```
/// # use folio::imaging::fit_width;
/// assert_eq!(fit_width((4000, 3000), 640), (640, 480));
/// assert_eq!(fit_width((300, 200), 640), (300, 200));
/// ```
pub fn fit_width(source: (u32, u32), max_width: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w <= max_width || src_w == 0 {
        return source;
    }
    let h = (src_h as f64 * max_width as f64 / src_w as f64).round() as u32;
    (max_width, h.max(1))
}

/// Scale `source` down to fit inside a `bounds` box, preserving aspect ratio.
///
/// Never enlarges. The constraining edge matches the box exactly; the other is
/// rounded and never drops below one pixel.
pub fn fit_inside(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;
    if (src_w <= max_w && src_h <= max_h) || src_w == 0 || src_h == 0 {
        return source;
    }

    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}
