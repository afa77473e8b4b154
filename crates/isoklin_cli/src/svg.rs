//! Standalone SVG rendering of a slope field plot.

use isoklin_core::sink::{FieldSink, PlotRequest};
use isoklin_core::{IsoklinError, IsoklinResult};
use std::fmt::Write;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 130.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const COLORBAR_WIDTH: f64 = 18.0;
const COLORBAR_STOPS: usize = 12;
/// Arrow length relative to the grid spacing.
const ARROW_FILL: f64 = 0.8;

/// Renders a [`PlotRequest`] into an SVG document.
#[derive(Debug, Clone)]
pub struct SvgSink {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgSink {
    fn default() -> Self {
        // 8 x 8 inch figure at 100 dpi.
        Self {
            width: 800,
            height: 800,
        }
    }
}

/// `t` in [0, 1] on the cyclic hsv colormap (red at both ends).
pub fn hsv_color(t: f64) -> (u8, u8, u8) {
    let h = t.rem_euclid(1.0) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    let channel = |c: f64| (c * 255.0).round() as u8;
    (channel(r), channel(g), channel(b))
}

/// Tick positions at 1, 2 or 5 times a power of ten, about `target` of them.
fn nice_ticks(min: f64, max: f64, target: usize) -> Vec<f64> {
    let raw = (max - min) / target.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);
    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}

struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn px(&self, x: f64) -> f64 {
        self.left + (x - self.x_min) / (self.x_max - self.x_min) * self.width
    }

    fn py(&self, y: f64) -> f64 {
        self.top + (self.y_max - y) / (self.y_max - self.y_min) * self.height
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl SvgSink {
    fn write_document(&self, request: &PlotRequest<'_>, out: &mut String) -> std::fmt::Result {
        let field = request.field;
        let (x_min, x_max) = field.config.x_range;
        let (y_min, y_max) = field.config.y_range;
        let (w, h) = (self.width as f64, self.height as f64);
        let frame = Frame {
            x_min,
            x_max,
            y_min,
            y_max,
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: w - MARGIN_LEFT - MARGIN_RIGHT,
            height: h - MARGIN_TOP - MARGIN_BOTTOM,
        };

        writeln!(
            out,
            "<svg width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" xmlns=\"http://www.w3.org/2000/svg\" font-family=\"sans-serif\">"
        )?;
        writeln!(out, "<rect width=\"{w}\" height=\"{h}\" fill=\"white\"/>")?;

        // Grid and ticks.
        writeln!(out, "<g stroke=\"#b0b0b0\" stroke-width=\"0.8\">")?;
        let x_ticks = nice_ticks(x_min, x_max, 8);
        let y_ticks = nice_ticks(y_min, y_max, 8);
        for &t in &x_ticks {
            let x = frame.px(t);
            writeln!(
                out,
                "<line x1=\"{x:.2}\" y1=\"{:.2}\" x2=\"{x:.2}\" y2=\"{:.2}\"/>",
                frame.top,
                frame.top + frame.height
            )?;
        }
        for &t in &y_ticks {
            let y = frame.py(t);
            writeln!(
                out,
                "<line x1=\"{:.2}\" y1=\"{y:.2}\" x2=\"{:.2}\" y2=\"{y:.2}\"/>",
                frame.left,
                frame.left + frame.width
            )?;
        }
        writeln!(out, "</g>")?;
        writeln!(out, "<g font-size=\"12\" fill=\"black\">")?;
        for &t in &x_ticks {
            writeln!(
                out,
                "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{t}</text>",
                frame.px(t),
                frame.top + frame.height + 18.0
            )?;
        }
        for &t in &y_ticks {
            writeln!(
                out,
                "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\">{t}</text>",
                frame.left - 8.0,
                frame.py(t) + 4.0
            )?;
        }
        writeln!(out, "</g>")?;

        self.write_arrows(request, &frame, out)?;
        self.write_contours(request, &frame, out)?;

        writeln!(
            out,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"none\" stroke=\"black\"/>",
            frame.left, frame.top, frame.width, frame.height
        )?;
        writeln!(
            out,
            "<text x=\"{:.2}\" y=\"30\" font-size=\"16\" text-anchor=\"middle\">{}</text>",
            frame.left + frame.width / 2.0,
            escape(request.title)
        )?;
        writeln!(
            out,
            "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"14\" text-anchor=\"middle\">{}</text>",
            frame.left + frame.width / 2.0,
            h - 15.0,
            escape(request.x_label)
        )?;
        writeln!(
            out,
            "<text x=\"20\" y=\"{:.2}\" font-size=\"14\" text-anchor=\"middle\" transform=\"rotate(-90 20 {:.2})\">{}</text>",
            frame.top + frame.height / 2.0,
            frame.top + frame.height / 2.0,
            escape(request.y_label)
        )?;

        self.write_colorbar(request, &frame, out)?;
        writeln!(out, "</svg>")
    }

    fn write_arrows(
        &self,
        request: &PlotRequest<'_>,
        frame: &Frame,
        out: &mut String,
    ) -> std::fmt::Result {
        let field = request.field;
        let (rows, cols) = field.grid.shape();
        let spacing_x = frame.width / (cols.max(2) - 1) as f64;
        let spacing_y = frame.height / (rows.max(2) - 1) as f64;
        let length = ARROW_FILL * spacing_x.min(spacing_y);
        let head = length * 0.3;

        writeln!(out, "<g stroke-width=\"1.2\">")?;
        for i in 0..rows {
            for j in 0..cols {
                let (u, v) = (field.directions.u[(i, j)], field.directions.v[(i, j)]);
                let hue = field.colors[(i, j)];
                if !u.is_finite() || !v.is_finite() || !hue.is_finite() {
                    continue;
                }
                let (r, g, b) = hsv_color(hue);
                // Arrow is centred on the grid point; screen y grows downwards.
                let cx = frame.px(field.grid.x[(i, j)]);
                let cy = frame.py(field.grid.y[(i, j)]);
                let (dx, dy) = (u * length, -v * length);
                let (x0, y0) = (cx - dx / 2.0, cy - dy / 2.0);
                let (x1, y1) = (cx + dx / 2.0, cy + dy / 2.0);
                let (lx, ly) = (x1 - u * head - v * head * 0.5, y1 + v * head - u * head * 0.5);
                let (rx, ry) = (x1 - u * head + v * head * 0.5, y1 + v * head + u * head * 0.5);
                writeln!(
                    out,
                    "<path d=\"M{x0:.2},{y0:.2} L{x1:.2},{y1:.2} M{lx:.2},{ly:.2} L{x1:.2},{y1:.2} L{rx:.2},{ry:.2}\" stroke=\"rgb({r},{g},{b})\" fill=\"none\"/>"
                )?;
            }
        }
        writeln!(out, "</g>")
    }

    fn write_contours(
        &self,
        request: &PlotRequest<'_>,
        frame: &Frame,
        out: &mut String,
    ) -> std::fmt::Result {
        writeln!(out, "<g stroke=\"black\" stroke-width=\"1\" fill=\"none\">")?;
        for contour in request.contours {
            for pair in contour.segments.chunks_exact(2) {
                let [ax, ay] = contour.vertex(pair[0]);
                let [bx, by] = contour.vertex(pair[1]);
                writeln!(
                    out,
                    "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\"/>",
                    frame.px(ax),
                    frame.py(ay),
                    frame.px(bx),
                    frame.py(by)
                )?;
            }
        }
        writeln!(out, "</g>")?;

        if !request.label_contours {
            return Ok(());
        }
        writeln!(out, "<g font-size=\"8\" fill=\"black\" text-anchor=\"middle\">")?;
        for contour in request.contours {
            if let Some([x, y]) = contour.label_anchor {
                writeln!(
                    out,
                    "<text x=\"{:.2}\" y=\"{:.2}\" stroke=\"white\" stroke-width=\"3\" paint-order=\"stroke\">{:.3}</text>",
                    frame.px(x),
                    frame.py(y),
                    contour.level
                )?;
            }
        }
        writeln!(out, "</g>")
    }

    fn write_colorbar(
        &self,
        request: &PlotRequest<'_>,
        frame: &Frame,
        out: &mut String,
    ) -> std::fmt::Result {
        let x = frame.left + frame.width + 25.0;
        let (top, height) = (frame.top, frame.height);
        writeln!(
            out,
            "<defs><linearGradient id=\"colorbar\" x1=\"0\" y1=\"1\" x2=\"0\" y2=\"0\">"
        )?;
        for k in 0..=COLORBAR_STOPS {
            let t = k as f64 / COLORBAR_STOPS as f64;
            let (r, g, b) = hsv_color(t.min(0.999_999));
            writeln!(
                out,
                "<stop offset=\"{t:.4}\" stop-color=\"rgb({r},{g},{b})\"/>"
            )?;
        }
        writeln!(out, "</linearGradient></defs>")?;
        writeln!(
            out,
            "<rect x=\"{x:.2}\" y=\"{top:.2}\" width=\"{COLORBAR_WIDTH}\" height=\"{height:.2}\" fill=\"url(#colorbar)\" stroke=\"black\"/>"
        )?;
        for k in 0..=4 {
            let t = k as f64 / 4.0;
            let y = top + (1.0 - t) * height;
            writeln!(
                out,
                "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"11\">{t:.2}</text>",
                x + COLORBAR_WIDTH + 4.0,
                y + 4.0
            )?;
        }
        let label_x = x + COLORBAR_WIDTH + 55.0;
        let label_y = top + height / 2.0;
        writeln!(
            out,
            "<text x=\"{label_x:.2}\" y=\"{label_y:.2}\" font-size=\"12\" text-anchor=\"middle\" transform=\"rotate(90 {label_x:.2} {label_y:.2})\">{}</text>",
            escape(request.colorbar_label)
        )
    }
}

impl FieldSink for SvgSink {
    type Output = String;

    fn render(&mut self, request: &PlotRequest<'_>) -> IsoklinResult<String> {
        if request.colormap != "hsv" {
            return Err(IsoklinError::Render(format!(
                "unsupported colormap '{}'",
                request.colormap
            )));
        }
        if (self.width as f64) <= MARGIN_LEFT + MARGIN_RIGHT
            || (self.height as f64) <= MARGIN_TOP + MARGIN_BOTTOM
        {
            return Err(IsoklinError::Render(format!(
                "canvas {}x{} is too small",
                self.width, self.height
            )));
        }
        let mut out = String::new();
        self.write_document(request, &mut out)
            .map_err(|err| IsoklinError::Render(err.to_string()))?;
        Ok(out)
    }
}
