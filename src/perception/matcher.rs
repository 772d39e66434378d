//! Template matching with a normalized correlation score.
//!
//! Scores are zero-mean normalized cross-correlation (ZNCC) on luminance,
//! so `1.0` is a pixel-perfect match and the `confidence` threshold of a
//! locate call is compared directly against it. The raw cross-correlation
//! comes from `imageproc::template_matching`; window means and variances
//! come from integral images. Large templates are first searched on a
//! downsampled level, then refined at full resolution around the best
//! coarse candidates.
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbaImage};
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use crate::perception::types::MatchCandidate;

/// Coarse candidates refined at full resolution.
const COARSE_CANDIDATES: usize = 8;
/// Minimum side of a template on the coarse level.
const MIN_COARSE_SIDE: u32 = 12;
/// Per-pixel variance below which a window counts as flat.
const FLAT_EPSILON: f64 = 1e-3;

type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;
type SumTable = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Luminance template with its sums precomputed.
struct Template<'a> {
    gray: &'a GrayImage,
    n: f64,
    sum: f64,
    /// Sum of squared deviations from the mean.
    spread: f64,
}

impl<'a> Template<'a> {
    fn new(gray: &'a GrayImage) -> Self {
        let n = (gray.width() * gray.height()) as f64;
        let (sum, sq) = gray.pixels().fold((0.0, 0.0), |(s, q), p| {
            let v = p[0] as f64;
            (s + v, q + v * v)
        });
        Self {
            gray,
            n,
            sum,
            spread: (sq - sum * sum / n).max(0.0),
        }
    }

    fn mean(&self) -> f64 {
        self.sum / self.n
    }

    fn is_flat(&self) -> bool {
        self.spread / self.n < FLAT_EPSILON
    }

    fn score(&self, window_sum: f64, window_sq: f64, cross: f64) -> f64 {
        let window_spread = (window_sq - window_sum * window_sum / self.n).max(0.0);
        let window_flat = window_spread / self.n < FLAT_EPSILON;
        if self.is_flat() {
            if window_flat {
                return 1.0 - (window_sum / self.n - self.mean()).abs() / 255.0;
            }
            return 0.0;
        }
        if window_flat {
            return 0.0;
        }
        let covariance = cross - window_sum * self.sum / self.n;
        (covariance / (window_spread * self.spread).sqrt()).clamp(0.0, 1.0)
    }
}

/// Window sums over a frame.
struct WindowStats {
    sum: SumTable,
    sq: SumTable,
}

impl WindowStats {
    fn new(frame: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(frame),
            sq: integral_squared_image::<_, u64>(frame),
        }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let rect = |table: &SumTable| {
            let at = |x: u32, y: u32| table.get_pixel(x, y)[0] as f64;
            at(x + w, y + h) - at(x, y + h) - at(x + w, y) + at(x, y)
        };
        (rect(&self.sum), rect(&self.sq))
    }
}

/// ZNCC score of `template` at every window position of `frame`.
fn score_map(frame: &GrayImage, template: &Template) -> ScoreMap {
    let (tw, th) = template.gray.dimensions();
    let stats = WindowStats::new(frame);
    let cross = match_template(frame, template.gray, MatchTemplateMethod::CrossCorrelation);
    ImageBuffer::from_fn(cross.width(), cross.height(), |x, y| {
        let (sum, sq) = stats.window(x, y, tw, th);
        Luma([template.score(sum, sq, cross.get_pixel(x, y)[0] as f64) as f32])
    })
}

/// Best window of a score map, shifted into frame coordinates.
fn best_in(map: &ScoreMap, dx: u32, dy: u32) -> (u32, u32, f64) {
    let extremes = find_extremes(map);
    let (x, y) = extremes.max_value_location;
    (x + dx, y + dy, extremes.max_value as f64)
}

/// Find the best match of `template` on `screen` scoring at least `confidence`.
///
/// Deterministic for a given frame and template.
pub fn find_best(screen: &RgbaImage, template: &RgbaImage, confidence: f64) -> Option<MatchCandidate> {
    let (tw, th) = template.dimensions();
    let (sw, sh) = screen.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let frame = imageops::grayscale(screen);
    let template_gray = imageops::grayscale(template);
    let prepared = Template::new(&template_gray);
    let factor = pyramid_factor(tw, th);

    let (left, top, score) = if factor > 1 && !prepared.is_flat() {
        coarse_to_fine(&frame, &prepared, factor)
    } else {
        Some(best_in(&score_map(&frame, &prepared), 0, 0))
    }?;

    if score + 1e-6 >= confidence {
        Some(MatchCandidate {
            left,
            top,
            width: tw,
            height: th,
            score,
        })
    } else {
        tracing::trace!(score, confidence, "best match below confidence");
        None
    }
}

fn pyramid_factor(tw: u32, th: u32) -> u32 {
    let side = tw.min(th);
    if side >= MIN_COARSE_SIDE * 4 {
        4
    } else if side >= MIN_COARSE_SIDE * 2 {
        2
    } else {
        1
    }
}

fn coarse_to_fine(frame: &GrayImage, template: &Template, factor: u32) -> Option<(u32, u32, f64)> {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.gray.dimensions();
    let small_frame = imageops::resize(frame, fw / factor, fh / factor, FilterType::Triangle);
    let small_gray = imageops::resize(template.gray, tw / factor, th / factor, FilterType::Triangle);
    let small = Template::new(&small_gray);
    if small.is_flat() {
        return Some(best_in(&score_map(frame, template), 0, 0));
    }

    let coarse = score_map(&small_frame, &small);
    let margin = factor * 2;
    peaks(&coarse, small_gray.width() / 2, small_gray.height() / 2)
        .into_iter()
        .filter_map(|(cx, cy)| {
            let left = (cx * factor).saturating_sub(margin);
            let top = (cy * factor).saturating_sub(margin);
            let right = (cx * factor + tw + margin).min(fw);
            let bottom = (cy * factor + th + margin).min(fh);
            if right - left < tw || bottom - top < th {
                return None;
            }
            let window = imageops::crop_imm(frame, left, top, right - left, bottom - top).to_image();
            Some(best_in(&score_map(&window, template), left, top))
        })
        .fold(None, |best: Option<(u32, u32, f64)>, found| match best {
            Some(b) if b.2 >= found.2 => Some(b),
            _ => Some(found),
        })
}

/// Highest scoring positions of a coarse map, at least `reach` apart on some axis.
fn peaks(map: &ScoreMap, reach_x: u32, reach_y: u32) -> Vec<(u32, u32)> {
    let mut scored: Vec<(f32, u32, u32)> = map.enumerate_pixels().map(|(x, y, p)| (p[0], x, y)).collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    let mut picked: Vec<(u32, u32)> = Vec::with_capacity(COARSE_CANDIDATES);
    for (_, x, y) in scored {
        if picked.len() == COARSE_CANDIDATES {
            break;
        }
        if picked
            .iter()
            .all(|&(px, py)| px.abs_diff(x) > reach_x.max(1) || py.abs_diff(y) > reach_y.max(1))
        {
            picked.push((x, y));
        }
    }
    picked
}
