//! 跳页输入框。

use super::*;

const MAX_DIGITS: usize = 6;

pub(super) fn open_page_picker(app: &mut App) {
    app.page_input = app.listing.page.to_string();
    app.mode = Mode::PagePicker;
    app.status = format!("输入页码 (1-{})，Enter 确认，Esc 取消", app.listing.max_page);
}

pub(super) fn handle_key_page_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.mode = Mode::List;
            app.status = "已取消跳页".to_string();
        }
        KeyCode::Char(c) if c.is_ascii_digit() => {
            if app.page_input.len() < MAX_DIGITS {
                app.page_input.push(c);
            }
        }
        KeyCode::Backspace => {
            app.page_input.pop();
        }
        KeyCode::Left => step(app, -1),
        KeyCode::Right => step(app, 1),
        KeyCode::Enter => {
            let page = app.page_input.parse::<u32>().unwrap_or(0);
            // 越界时保持在输入框，不发请求
            if super::request_page(app, page) {
                app.mode = Mode::List;
            }
        }
        _ => {}
    }
}

fn step(app: &mut App, delta: i64) {
    let max = i64::from(app.listing.max_page.max(1));
    let current = app.page_input.parse::<i64>().unwrap_or(1);
    app.page_input = (current + delta).clamp(1, max).to_string();
}

pub(super) fn draw_page_picker(frame: &mut ratatui::Frame, app: &mut App) {
    let base = frame.size();
    let width = 36.min(base.width);
    let area = Rect {
        x: base.x + base.width.saturating_sub(width) / 2,
        y: base.y + base.height.saturating_sub(3) / 2,
        width,
        height: 3.min(base.height),
    };
    let text = Line::from(vec![
        Span::raw(format!("{} ", app.page_input)),
        Span::styled(
            format!("/ {}", app.listing.max_page),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .title("跳转到页 (←/→ ±1)"),
        ),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::super::tests::{harness, key, press, pump};
    use super::*;

    #[test]
    fn out_of_range_page_is_rejected_without_fetch() {
        let mut h = harness(Vec::new());
        let hits = h.server.hits();
        press(&mut h.app, "p");
        assert_eq!(h.app.mode, Mode::PagePicker);
        assert_eq!(h.app.page_input, "1");

        press(&mut h.app, "9");
        handle_key(&mut h.app, key(KeyCode::Enter));
        assert_eq!(h.app.mode, Mode::PagePicker);
        assert!(h.app.status.contains("超出"));
        assert_eq!(h.app.page_inflight, None);
        assert_eq!(h.server.hits(), hits);
    }

    #[test]
    fn committing_valid_page_fetches_it() {
        let mut h = harness(Vec::new());
        press(&mut h.app, "p");
        handle_key(&mut h.app, key(KeyCode::Backspace));
        press(&mut h.app, "3");
        handle_key(&mut h.app, key(KeyCode::Enter));
        assert_eq!(h.app.mode, Mode::List);
        assert_eq!(h.app.page_inflight, Some(3));
        pump(&mut h.app);
        assert_eq!(h.app.listing.page, 3);
    }

    #[test]
    fn arrows_step_within_bounds() {
        let mut h = harness(Vec::new());
        press(&mut h.app, "p");
        handle_key(&mut h.app, key(KeyCode::Left));
        assert_eq!(h.app.page_input, "1");
        for _ in 0..10 {
            handle_key(&mut h.app, key(KeyCode::Right));
        }
        assert_eq!(h.app.page_input, "4");
    }

    #[test]
    fn esc_cancels_without_change() {
        let mut h = harness(Vec::new());
        press(&mut h.app, "p7");
        handle_key(&mut h.app, key(KeyCode::Esc));
        assert_eq!(h.app.mode, Mode::List);
        assert_eq!(h.app.listing.page, 1);
    }
}
