// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference of the tone pipeline
//!
//! Mirrors `tone_main` in `compositor.wgsl`. Stage order:
//!
//! 1. brightness
//! 2. contrast
//! 3. highlights / shadows
//! 4. saturation and hue (HSV round trip)
//! 5. vibrance
//! 6. temperature / tint
//! 7. lift / gamma / gain
//! 8. color intensity
//! 9. vignette
//!
//! A stage whose parameter is exactly 0 is skipped, so a neutral vector is
//! an exact identity. Every stage clamps its output to [0, 1].

use crate::shaders::FrameUniforms;

pub type Rgb = [f32; 3];

/// BT.601 luma
#[inline]
pub fn luma(c: Rgb) -> f32 {
    0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2]
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn clamp01(c: Rgb) -> Rgb {
    [
        c[0].clamp(0.0, 1.0),
        c[1].clamp(0.0, 1.0),
        c[2].clamp(0.0, 1.0),
    ]
}

#[inline]
fn map(c: Rgb, f: impl Fn(f32) -> f32) -> Rgb {
    clamp01([f(c[0]), f(c[1]), f(c[2])])
}

/// RGB to (hue in turns, saturation, value)
pub fn rgb_to_hsv(c: Rgb) -> [f32; 3] {
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    let delta = max - min;

    let h = if delta <= 0.0 {
        0.0
    } else if max == c[0] {
        ((c[1] - c[2]) / delta).rem_euclid(6.0) / 6.0
    } else if max == c[1] {
        ((c[2] - c[0]) / delta + 2.0) / 6.0
    } else {
        ((c[0] - c[1]) / delta + 4.0) / 6.0
    };
    let s = if max <= 0.0 { 0.0 } else { delta / max };
    [h, s, max]
}

pub fn hsv_to_rgb(hsv: [f32; 3]) -> Rgb {
    let [h, s, v] = hsv;
    let h6 = (h - h.floor()) * 6.0;
    let chroma = v * s;
    let x = chroma * (1.0 - ((h6 % 2.0) - 1.0).abs());
    let m = v - chroma;
    let (r, g, b) = match h6 as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    clamp01([r + m, g + m, b + m])
}

/// Apply every tone stage to one color
///
/// `uv` is the output pixel center in [0, 1]², used by the vignette.
pub fn apply_tone(mut c: Rgb, u: &FrameUniforms, uv: [f32; 2]) -> Rgb {
    if u.brightness != 0.0 {
        let b = u.brightness * 0.25;
        c = map(c, |v| v + b);
    }

    if u.contrast != 0.0 {
        let k = 1.0 + u.contrast;
        c = map(c, |v| (v - 0.5) * k + 0.5);
    }

    if u.highlights != 0.0 {
        let w = smoothstep(0.5, 1.0, luma(c)) * u.highlights * 0.25;
        c = map(c, |v| v + w);
    }
    if u.shadows != 0.0 {
        let w = (1.0 - smoothstep(0.0, 0.5, luma(c))) * u.shadows * 0.25;
        c = map(c, |v| v + w);
    }

    if u.saturation != 0.0 || u.hue != 0.0 {
        let mut hsv = rgb_to_hsv(c);
        if u.saturation != 0.0 {
            hsv[1] = (hsv[1] * (1.0 + u.saturation)).clamp(0.0, 1.0);
        }
        if u.hue != 0.0 {
            let h = hsv[0] + u.hue * 0.5;
            hsv[0] = h - h.floor();
        }
        c = hsv_to_rgb(hsv);
    }

    if u.vibrance != 0.0 {
        let l = luma(c);
        let sat = c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2]);
        let amount = 1.0 + u.vibrance * (1.0 - sat);
        c = map(c, |v| l + (v - l) * amount);
    }

    if u.temperature != 0.0 || u.tint != 0.0 {
        let t = u.temperature * 0.1;
        c = clamp01([c[0] + t, c[1] - u.tint * 0.1, c[2] - t]);
    }

    for i in 0..3 {
        if u.lift[i] != 0.0 {
            c[i] = (c[i] + u.lift[i] * 0.2 * (1.0 - c[i])).clamp(0.0, 1.0);
        }
        if u.gamma[i] != 0.0 {
            c[i] = c[i].powf((-u.gamma[i]).exp2()).clamp(0.0, 1.0);
        }
        if u.gain[i] != 0.0 {
            c[i] = (c[i] * (1.0 + 0.5 * u.gain[i])).clamp(0.0, 1.0);
        }
    }

    if u.color_intensity != 0.0 {
        let k = 1.0 + 0.5 * u.color_intensity;
        c = map(c, |v| v * k);
    }

    if u.vignette != 0.0 {
        let dx = uv[0] - 0.5;
        let dy = uv[1] - 0.5;
        let dist = (dx * dx + dy * dy).sqrt() / std::f32::consts::FRAC_1_SQRT_2;
        let w = smoothstep(0.3, 0.9, dist) * u.vignette;
        c = if w < 0.0 {
            map(c, |v| v * (1.0 + w))
        } else {
            map(c, |v| v + (1.0 - v) * w)
        };
    }

    c
}
