//! Dialog rendering

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap};
use ratatui::Frame;

use crate::dialog::{Focus, MessageBox, ReportDialog, REPORT_MESSAGE, REPORT_TITLE};

/// Draw the crash report dialog centered on the frame
pub fn draw_report(frame: &mut Frame, dialog: &mut ReportDialog)
{
    let area = centered_rect(frame.area(), percent(frame.area().width, 90), percent(frame.area().height, 85));
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {REPORT_TITLE} "),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ))
        .style(Style::default().fg(Color::White));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2), // Message
        Constraint::Min(3),    // Report
        Constraint::Length(1), // Buttons
    ])
    .split(inner);

    let message = Paragraph::new(REPORT_MESSAGE).wrap(Wrap { trim: true });
    frame.render_widget(message, chunks[0]);

    draw_report_text(frame, chunks[1], dialog);
    draw_buttons(frame, chunks[2], dialog.focus());

    if let Some(notice) = dialog.notice() {
        draw_notice(frame, area, "Send Report", notice);
    }
}

fn draw_report_text(frame: &mut Frame, area: Rect, dialog: &mut ReportDialog)
{
    let block = Block::default().borders(Borders::ALL).title("Report");
    dialog.set_viewport(usize::from(block.inner(area).height));

    let lines: Vec<Line> = dialog.lines().iter().map(|line| Line::raw(line.as_str())).collect();
    let offset = u16::try_from(dialog.scroll()).unwrap_or(u16::MAX);
    let report = Paragraph::new(lines).block(block).scroll((offset, 0));
    frame.render_widget(report, area);

    let mut scrollbar = ScrollbarState::new(dialog.lines().len()).position(dialog.scroll());
    frame.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight),
        area.inner(ratatui::layout::Margin { vertical: 1, horizontal: 0 }),
        &mut scrollbar,
    );
}

fn draw_buttons(frame: &mut Frame, area: Rect, focus: Focus)
{
    let buttons = Line::from(vec![
        button("Send Report", focus == Focus::SendReport),
        Span::raw("   "),
        button("Cancel", focus == Focus::Cancel),
    ])
    .centered();
    frame.render_widget(Paragraph::new(buttons), area);
}

fn button(label: &str, focused: bool) -> Span<'static>
{
    let style = if focused {
        Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Cyan)
    };
    Span::styled(format!("[ {label} ]"), style)
}

/// Draw a one-button message box centered on the frame
pub fn draw_message_box(frame: &mut Frame, message: &MessageBox)
{
    draw_notice(frame, frame.area(), message.title(), message.message());
}

fn draw_notice(frame: &mut Frame, within: Rect, title: &str, message: &str)
{
    let width = percent(within.width, 60).max(30);
    let text_width = usize::from(width.saturating_sub(4)).max(1);
    let text_rows = u16::try_from(message.chars().count().div_ceil(text_width)).unwrap_or(u16::MAX);
    let area = centered_rect(within, width, text_rows.saturating_add(4));
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "))
        .style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(inner);
    let text = Paragraph::new(message)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });
    frame.render_widget(text, chunks[0]);
    frame.render_widget(Paragraph::new(Line::from(button("OK", true)).centered()), chunks[1]);
}

/// `value * pct / 100`
fn percent(value: u16, pct: u16) -> u16
{
    u16::try_from(u32::from(value) * u32::from(pct) / 100).unwrap_or(value)
}

/// A `width` x `height` rect centered in `area`, shrunk to fit
#[must_use]
pub fn centered_rect(area: Rect, width: u16, height: u16) -> Rect
{
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
