//! 搜索结果列表：vim 风格移动、两位数字直选、翻页。

use super::*;

use ratatui::widgets::{List, ListItem};

pub(super) fn handle_key_list(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let after_g = std::mem::take(&mut app.pending_g);
    let chord = app.digit_chord.take();
    let half = (app.list_height / 2).max(1) as isize;
    let full = app.list_height.max(1) as isize;

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => scroll_by(app, 1),
        KeyCode::Char('k') | KeyCode::Up => scroll_by(app, -1),
        KeyCode::Char('d') if ctrl => scroll_by(app, half),
        KeyCode::Char('u') if ctrl => scroll_by(app, -half),
        KeyCode::Char('f') if ctrl => scroll_by(app, full),
        KeyCode::Char('b') if ctrl => scroll_by(app, -full),
        KeyCode::Char('L') => scroll_by(app, half),
        KeyCode::Char('H') => scroll_by(app, -half),
        KeyCode::Char('J') | KeyCode::PageDown => scroll_by(app, full),
        KeyCode::Char('K') | KeyCode::PageUp => scroll_by(app, -full),
        KeyCode::Char('g') if after_g => select_row(app, 0),
        KeyCode::Char('g') => app.pending_g = true,
        KeyCode::Home => select_row(app, 0),
        KeyCode::Char('G') | KeyCode::End => {
            select_row(app, app.listing.rows.len().saturating_sub(1))
        }
        KeyCode::Enter => super::start_detail_task(app),
        KeyCode::Esc => cancel_pending(app),
        KeyCode::Char('p') => super::page_picker::open_page_picker(app),
        KeyCode::Char('n') | KeyCode::Char(']') => {
            let page = app.listing.page.saturating_add(1);
            super::request_page(app, page);
        }
        KeyCode::Char('N') | KeyCode::Char('[') => {
            let page = app.listing.page.saturating_sub(1);
            super::request_page(app, page);
        }
        KeyCode::Char(c) if c.is_ascii_digit() && !ctrl => {
            let digit = c.to_digit(10).unwrap_or(0) as usize;
            digit_select(app, chord, digit);
        }
        _ => {}
    }
}

/// 数字直选：单个数字选中第 n 行并等待第二位；两位数字后复位，超出行数取最后一行。
fn digit_select(app: &mut App, chord: Option<usize>, digit: usize) {
    if digit == 0 && chord.is_none() {
        return;
    }
    let num = chord.map_or(digit, |prev| prev * 10 + digit);
    let num = if num > 9 {
        num.min(app.listing.rows.len())
    } else {
        app.digit_chord = Some(num);
        num
    };
    if num > 0 {
        select_row(app, num - 1);
    }
}

/// Esc：放弃还没返回的详情/翻页请求，迟到的结果会被丢弃。
fn cancel_pending(app: &mut App) {
    if !app.detail_inflight && app.page_inflight.is_none() {
        return;
    }
    app.detail_inflight = false;
    app.detail_generation += 1;
    app.page_inflight = None;
    app.page_generation += 1;
    super::stop_spinner(app);
    app.status = "已取消".to_string();
}

fn select_row(app: &mut App, idx: usize) {
    let len = app.listing.rows.len();
    if len == 0 {
        app.list_state.select(None);
        return;
    }
    app.list_state.select(Some(idx.min(len - 1)));
}

fn scroll_by(app: &mut App, delta: isize) {
    let current = app.list_state.selected().unwrap_or(0) as isize;
    select_row(app, (current + delta).max(0) as usize);
}

pub(super) fn draw_list(frame: &mut ratatui::Frame, area: Rect, app: &mut App) {
    app.list_height = area.height.saturating_sub(2) as usize;
    let delimiter = app.config.key_delimiter.as_str();
    let items: Vec<ListItem> = app
        .listing
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>2}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::raw(row.key(app.repo.as_ref(), delimiter)),
            ]))
        })
        .collect();

    let title = format!("搜索: {}", app.query.term());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.list_state);
}
