//! Presentation surfaces
//!
//! A surface receives finished frames and shows them. It has no access to
//! the store or the state, so swapping surfaces never touches state logic.

use std::io::Write;

use crate::error::Result;
use crate::palette::{Rgb, COLOR_MASKED};
use crate::render::{Frame, MatrixCell, MatrixView};

pub trait Surface {
    fn present(&mut self, frame: &Frame) -> Result<()>;
}

/// Keeps every frame in memory
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub frames: Vec<Frame>,
}

impl RecordingSurface {
    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }
}

impl Surface for RecordingSurface {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// One JSON document per line
pub struct JsonSurface<W: Write> {
    out: W,
}

impl<W: Write> JsonSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Surface for JsonSurface<W> {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        serde_json::to_writer(&mut self.out, frame)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

const LABEL_WIDTH: usize = 8;
const BAR_WIDTH: usize = 30;
const SHADES: [char; 5] = [' ', '░', '▒', '▓', '█'];
const MASKED_GLYPH: &str = "· ";

fn fit(label: &str, width: usize) -> String {
    let clipped: String = label.chars().take(width).collect();
    format!("{clipped:>width$}")
}

fn bar(value: f32, width: usize) -> String {
    let len = (value.clamp(0.0, 1.0) * width as f32).round() as usize;
    "█".repeat(len)
}

/// Terminal rendering, 24-bit color or plain glyphs
pub struct TextSurface<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> TextSurface<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    fn cell(&self, cell: &MatrixCell) -> String {
        match cell {
            MatrixCell::Masked => {
                if self.color {
                    let Rgb(r, g, b) = COLOR_MASKED;
                    format!("\x1b[2;48;2;{r};{g};{b}m{MASKED_GLYPH}\x1b[0m")
                } else {
                    MASKED_GLYPH.to_string()
                }
            }
            MatrixCell::Weight { value, color, .. } => {
                if self.color {
                    let Rgb(r, g, b) = *color;
                    format!("\x1b[48;2;{r};{g};{b}m  \x1b[0m")
                } else {
                    let level = (value.clamp(0.0, 1.0) * (SHADES.len() - 1) as f32).round() as usize;
                    let shade = SHADES[level];
                    format!("{shade}{shade}")
                }
            }
        }
    }

    fn paint(&self, text: &str, color: Rgb) -> String {
        if self.color {
            let Rgb(r, g, b) = color;
            format!("\x1b[38;2;{r};{g};{b}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn write_matrix(&mut self, view: &MatrixView) -> Result<()> {
        writeln!(self.out, "  Head {}", view.head)?;
        write!(self.out, "{} ", " ".repeat(LABEL_WIDTH))?;
        for label in &view.labels {
            write!(self.out, "{}", fit(label, 2))?;
        }
        writeln!(self.out)?;

        for (label, row) in view.labels.iter().zip(&view.rows) {
            let cells: String = row.iter().map(|c| self.cell(c)).collect();
            writeln!(self.out, "{} {cells}", fit(label, LABEL_WIDTH))?;
        }
        Ok(())
    }
}

impl<W: Write> Surface for TextSurface<W> {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        let h = &frame.header;
        let heads = match h.compare_head {
            Some(other) => format!("head {} vs {}", h.head, other),
            None => format!("head {}", h.head),
        };
        writeln!(
            self.out,
            "== {} | layer {}/{} | {} | {} heads | {} tokens | {} ==",
            h.model_name,
            h.layer,
            h.n_layers.saturating_sub(1),
            heads,
            h.n_heads,
            h.n_tokens,
            if h.playing { "playing" } else { "paused" }
        )?;

        writeln!(self.out, "Attention matrix (layer {})", h.layer)?;
        for view in &frame.matrices {
            self.write_matrix(view)?;
        }

        let dist = &frame.distribution;
        writeln!(
            self.out,
            "Distribution: \"{}\" (token {}, head {})",
            dist.row_label, dist.row, dist.head
        )?;
        for b in &dist.bars {
            let filled = self.paint(&bar(b.value, BAR_WIDTH), b.color);
            writeln!(
                self.out,
                "{} {filled} {:.1}%",
                fit(&b.label, LABEL_WIDTH),
                b.value * 100.0
            )?;
        }

        if let Some(tip) = &frame.tooltip {
            writeln!(
                self.out,
                "Tooltip: {} = {} (head {})",
                tip.pair, tip.percent, tip.head
            )?;
            for r in &tip.ranking {
                let filled = self.paint(&bar(r.value, 10), r.color);
                writeln!(
                    self.out,
                    "  {}. {} {filled} {}",
                    r.rank,
                    fit(&r.label, LABEL_WIDTH),
                    r.percent
                )?;
            }
        }

        writeln!(self.out, "Entropy (layer {})", frame.entropy.layer)?;
        let max = frame
            .entropy
            .bars
            .iter()
            .map(|b| b.value)
            .fold(0.0_f64, f64::max);
        for b in &frame.entropy.bars {
            let scaled = if max > 0.0 { (b.value / max) as f32 } else { 0.0 };
            let filled = self.paint(&bar(scaled, 20), b.color);
            writeln!(self.out, "  h{:<3} {filled} {:.3}", b.head, b.value)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::{AttentionStore, ModelMeta};
    use crate::render::Renderer;
    use crate::state::{HoveredCell, ViewState};

    fn frame() -> Frame {
        let slice = vec![vec![1.0, 0.3], vec![0.25, 0.75]];
        let meta = ModelMeta {
            model_name: "tiny".into(),
            n_layers: 1,
            n_heads: 1,
        };
        let store =
            AttentionStore::new(vec!["The".into(), "Ġend".into()], &[vec![slice]], meta).unwrap();
        let mut state = ViewState::new(1);
        state.selected_token = 1;
        state.hovered = Some(HoveredCell { row: 1, col: 0, head: 0 });
        Renderer::default().render(&store, &state).unwrap()
    }

    #[test]
    fn test_plain_text_output() {
        let mut out = Vec::new();
        TextSurface::new(&mut out, false).present(&frame()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("== tiny | layer 0/0 | head 0 | 1 heads | 2 tokens | paused =="));
        assert!(text.contains(MASKED_GLYPH));
        assert!(text.contains("Distribution: \"end\""));
        assert!(text.contains("75.0%"));
        assert!(text.contains("Tooltip: \"end\" → \"The\" = 25.0%"));
        assert!(!text.contains('\x1b'));
        // the masked cell's stored 0.3 never leaks
        assert!(!text.contains("30.0%"));
    }

    #[test]
    fn test_color_output_uses_ansi() {
        let mut out = Vec::new();
        TextSurface::new(&mut out, true).present(&frame()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[48;2;"));
        // masked cells are dimmed on their own background
        assert!(text.contains("\x1b[2;48;2;245;245;245m· \x1b[0m"));
    }

    #[test]
    fn test_json_surface_one_line_per_frame() {
        let mut out = Vec::new();
        {
            let mut surface = JsonSurface::new(&mut out);
            surface.present(&frame()).unwrap();
            surface.present(&frame()).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["header"]["model_name"], "tiny");
        assert_eq!(value["matrices"][0]["rows"][0][1]["kind"], "masked");
        let color = value["matrices"][0]["rows"][1][0]["color"].as_str().unwrap();
        assert!(color.starts_with('#') && color.len() == 7, "{color}");
    }

    #[test]
    fn test_recording_surface() {
        let mut surface = RecordingSurface::default();
        surface.present(&frame()).unwrap();
        assert_eq!(surface.frames.len(), 1);
        assert!(surface.last().is_some());
    }
}
