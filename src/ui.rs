//! Terminal spectrum display: per-band bars with peak markers at ~60 FPS.

use std::time::{Duration, Instant};

use anyhow::Result;
use ratatui::buffer::Buffer;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use ratatui::{DefaultTerminal, Frame};

use crate::analyzer::{SpectrumAnalyzer, SpectrumData};
use crate::capture::AudioStats;

const FRAME_DURATION: Duration = Duration::from_millis(16);

const HEADER_LINES: u16 = 2;
const FOOTER_LINES: u16 = 2;

/// Runs the render loop until the user quits with `q` or `Esc`.
///
/// Takes ownership of the analyzer, starts capture, and restores the
/// terminal before propagating any error.
pub fn run(mut analyzer: SpectrumAnalyzer) -> Result<()> {
    analyzer.start()?;

    let mut terminal = ratatui::init();
    let result = render_loop(&mut terminal, &mut analyzer);
    ratatui::restore();

    analyzer.stop();
    result
}

fn render_loop(terminal: &mut DefaultTerminal, analyzer: &mut SpectrumAnalyzer) -> Result<()> {
    loop {
        let frame_start = Instant::now();

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && should_quit(key.code, key.modifiers)
            {
                return Ok(());
            }
        }

        let data = analyzer.update();
        let stats = analyzer.audio().stats();
        let device = analyzer.audio().device_name().to_string();

        terminal.draw(|frame| draw(frame, &data, &stats, &device))?;

        // Pace to ~60 FPS; a slow terminal just runs fewer frames.
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            std::thread::sleep(FRAME_DURATION - elapsed);
        }
    }
}

fn should_quit(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn draw(frame: &mut Frame, data: &SpectrumData, stats: &AudioStats, device: &str) {
    let area = frame.area();
    if area.height < HEADER_LINES + FOOTER_LINES + 3 || area.width < 12 {
        frame.render_widget(Paragraph::new("Terminal too small"), area);
        return;
    }

    let [header, bars, footer] = Layout::vertical([
        Constraint::Length(HEADER_LINES),
        Constraint::Min(3),
        Constraint::Length(FOOTER_LINES),
    ])
    .areas(area);

    let rule = "─".repeat(area.width as usize);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(format!("SPECTRUM ANALYZER [{device}]"))
                .bold()
                .centered(),
            Line::from(rule.clone()),
        ]),
        header,
    );

    draw_bars(frame.buffer_mut(), bars, data);

    frame.render_widget(
        Paragraph::new(vec![
            Line::from(rule),
            Line::from(format!(
                " RMS: {:.2}  Peak: {:.2}  Captured: {}k  Overruns: {}",
                data.rms_level,
                data.peak_level,
                stats.frames_captured / 1000,
                stats.overruns
            )),
        ]),
        footer,
    );
    let hint_row = Rect::new(footer.x, footer.y + 1, footer.width, 1);
    frame.render_widget(
        Paragraph::new(Line::from("[q] Quit ").right_aligned()),
        hint_row,
    );
}

/// Paints one column of block cells per band, colored by height, with a
/// magenta marker where the peak hold sits above the bar.
fn draw_bars(buf: &mut Buffer, area: Rect, data: &SpectrumData) {
    let num_bands = data.magnitudes.len();
    let viz_height = area.height as usize;
    let viz_width = area.width.saturating_sub(2) as usize; // one-cell side margins
    if num_bands == 0 || viz_height < 2 || viz_width == 0 {
        return;
    }

    let mut bar_width = (viz_width / num_bands).max(1);
    let mut gap = 0;
    if bar_width >= 3 {
        gap = 1;
        let usable = viz_width.saturating_sub(num_bands - 1);
        bar_width = (usable / num_bands).max(1);
    }

    let base_y = area.y + area.height - 1;
    let mut x = area.x + 1;

    for band in 0..num_bands {
        if x + bar_width as u16 > area.x + area.width - 1 {
            break;
        }

        let magnitude = data.magnitudes[band].clamp(0.0, 1.0);
        let peak = data.peaks[band].clamp(0.0, 1.0);
        let bar_height = (magnitude * (viz_height - 1) as f32) as usize;
        let peak_row = (peak * (viz_height - 1) as f32) as usize;

        for y in 0..bar_height {
            let color = gradient_color(y as f32 / (viz_height - 1) as f32);
            for bx in 0..bar_width as u16 {
                if let Some(cell) = buf.cell_mut((x + bx, base_y - y as u16)) {
                    cell.set_symbol("█").set_fg(color);
                }
            }
        }

        if peak_row > bar_height && peak_row < viz_height {
            let style = Style::new().fg(Color::Magenta).add_modifier(Modifier::BOLD);
            for bx in 0..bar_width as u16 {
                if let Some(cell) = buf.cell_mut((x + bx, base_y - peak_row as u16)) {
                    cell.set_symbol("─").set_style(style);
                }
            }
        }

        x += (bar_width + gap) as u16;
    }
}

/// Blue at the bottom through cyan, green, and yellow to red at the top.
fn gradient_color(height_ratio: f32) -> Color {
    if height_ratio > 0.9 {
        Color::Red
    } else if height_ratio > 0.7 {
        Color::Yellow
    } else if height_ratio > 0.5 {
        Color::Green
    } else if height_ratio > 0.3 {
        Color::Cyan
    } else {
        Color::Blue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_keys() {
        assert!(should_quit(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(should_quit(KeyCode::Char('Q'), KeyModifiers::SHIFT));
        assert!(should_quit(KeyCode::Esc, KeyModifiers::NONE));
        assert!(should_quit(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!should_quit(KeyCode::Char('c'), KeyModifiers::NONE));
        assert!(!should_quit(KeyCode::Enter, KeyModifiers::NONE));
    }

    #[test]
    fn gradient_spans_blue_to_red() {
        assert_eq!(gradient_color(0.0), Color::Blue);
        assert_eq!(gradient_color(0.4), Color::Cyan);
        assert_eq!(gradient_color(0.6), Color::Green);
        assert_eq!(gradient_color(0.8), Color::Yellow);
        assert_eq!(gradient_color(1.0), Color::Red);
    }
}
