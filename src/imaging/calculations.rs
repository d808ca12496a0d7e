//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate dimensions that fit entirely within a target box.
///
/// Scales the source by `min(target_w / src_w, target_h / src_h)` so one edge
/// touches the box and the other stays inside it. The image grows when the
/// box is larger than the source and shrinks when it is smaller. It is never
/// cropped and the aspect ratio is kept to within one pixel of rounding.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height), both non-zero
/// * `target` - Bounding box (width, height), both non-zero
///
/// # Returns
/// * `(width, height)` - Fit dimensions, each in `1..=target`
///
/// # Examples
/// ```
/// # use resize_worker::imaging::calculate_fit_dimensions;
/// // 16:9 into a square box → width touches, height rounds 168.75 up
/// assert_eq!(calculate_fit_dimensions((1920, 1080), (300, 300)), (300, 169));
///
/// // Square into a landscape box → grows until height touches
/// assert_eq!(calculate_fit_dimensions((500, 500), (800, 600)), (600, 600));
/// ```
pub fn calculate_fit_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let scale_w = tgt_w as f64 / src_w as f64;
    let scale_h = tgt_h as f64 / src_h as f64;
    let scale = scale_w.min(scale_h);

    // Rounding can't push the binding edge past the box, but float error on
    // huge ratios can; clamp anyway. A sliver image still gets one pixel.
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, tgt_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, tgt_h);
    (w, h)
}
