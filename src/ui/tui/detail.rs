//! 详情弹窗：书籍字段、列表行信息、镜像选择与简介。

use super::*;

pub(super) fn handle_key_detail(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc => {
            app.mode = Mode::List;
            app.status = "返回列表".to_string();
        }
        KeyCode::Char('d') | KeyCode::Char('D') => super::start_download_task(app),
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => cycle(app, true),
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => cycle(app, false),
        KeyCode::Down | KeyCode::Char('j') => {
            if let Some(view) = app.detail.as_mut() {
                view.scroll = view.scroll.saturating_add(1);
            }
        }
        KeyCode::Up | KeyCode::Char('k') => {
            if let Some(view) = app.detail.as_mut() {
                view.scroll = view.scroll.saturating_sub(1);
            }
        }
        KeyCode::Char('c') => super::cover::open_cover(app),
        _ => {}
    }
}

fn cycle(app: &mut App, forward: bool) {
    if let Some(view) = app.detail.as_mut() {
        view.cycle_mirror(forward);
        if let Some(name) = view.selected_mirror() {
            app.status = format!("镜像: {name}");
        }
    }
}

fn field_lines(book: &BookRecord) -> Vec<(&'static str, &str)> {
    [
        ("作者", book.author.as_str()),
        ("出版社", &book.publisher),
        ("年份", &book.year),
        ("版次", &book.edition),
        ("丛书", &book.series),
        ("卷", &book.volume),
        ("语言", &book.language),
        ("页数", &book.pages),
        ("大小", &book.size),
        ("格式", &book.extension),
        ("ISBN", &book.isbn),
        ("ID", &book.id),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .collect()
}

/// 列表行里非关键列，以树形缩进展示。
fn tree_lines(details: &[String]) -> Vec<String> {
    let last = details.len().saturating_sub(1);
    details
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let branch = if i == last { "└─" } else { "├─" };
            format!("  {branch} {d}")
        })
        .collect()
}

fn wrapped_line_count(lines: &[Line], width: u16) -> usize {
    let w = width.max(1) as usize;
    lines
        .iter()
        .map(|line| {
            let plain: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
            textwrap::wrap(&plain, w).len().max(1)
        })
        .sum()
}

pub(super) fn draw_detail(frame: &mut ratatui::Frame, app: &mut App) {
    let area = super::centered_rect(80, 80, frame.size());
    let repo = Arc::clone(&app.repo);
    let Some(view) = app.detail.as_mut() else {
        return;
    };
    let book = &view.book;

    let label = Style::default().fg(Color::Cyan);
    let mut lines = vec![
        Line::from(Span::styled(
            book.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (name, value) in field_lines(book) {
        lines.push(Line::from(vec![
            Span::styled(format!("{name}: "), label),
            Span::raw(value.to_string()),
        ]));
    }
    for (name, value) in &book.extra {
        lines.push(Line::from(vec![
            Span::styled(format!("{name}: "), label),
            Span::raw(value.clone()),
        ]));
    }

    let details = view.row.details(repo.as_ref());
    if !details.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("列表信息", label)));
        lines.extend(tree_lines(&details).into_iter().map(Line::from));
    }

    lines.push(Line::from(""));
    let mut mirror_spans = vec![Span::styled("镜像: ", label)];
    for (i, name) in view.mirrors.iter().enumerate() {
        let style = if i == view.mirror_idx {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        mirror_spans.push(Span::styled(format!(" {name} "), style));
        mirror_spans.push(Span::raw(" "));
    }
    lines.push(Line::from(mirror_spans));

    if !book.synopsis.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("简介", label)));
        lines.extend(book.synopsis.lines().map(|l| Line::from(l.trim().to_string())));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title("详情 (d 下载 / Tab 切换镜像 / c 封面 / Esc 返回)")
        .title_alignment(Alignment::Center);
    let inner = block.inner(area);
    let total = wrapped_line_count(&lines, inner.width);
    let max_scroll = total
        .saturating_sub(inner.height as usize)
        .min(u16::MAX as usize) as u16;
    view.scroll = view.scroll.min(max_scroll);

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((view.scroll, 0)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::super::tests::{harness, key, press, pump};
    use super::*;

    #[test]
    fn mirrors_cycle_both_ways() {
        let mut h = harness(Vec::new());
        handle_key(&mut h.app, key(KeyCode::Enter));
        pump(&mut h.app);
        let selected = |app: &App| app.detail.as_ref().and_then(|v| v.selected_mirror()).map(str::to_string);

        assert_eq!(selected(&h.app).as_deref(), Some("Libgen.lc"));
        handle_key(&mut h.app, key(KeyCode::Tab));
        assert_eq!(selected(&h.app).as_deref(), Some("MirrorA"));
        handle_key(&mut h.app, key(KeyCode::Tab));
        assert_eq!(selected(&h.app).as_deref(), Some("Libgen.lc"));
        handle_key(&mut h.app, key(KeyCode::Left));
        assert_eq!(selected(&h.app).as_deref(), Some("MirrorA"));
    }

    #[test]
    fn scroll_never_underflows() {
        let mut h = harness(Vec::new());
        handle_key(&mut h.app, key(KeyCode::Enter));
        pump(&mut h.app);
        press(&mut h.app, "kjj");
        assert_eq!(h.app.detail.as_ref().map(|v| v.scroll), Some(2));
    }

    #[test]
    fn tree_marks_last_branch() {
        let lines = tree_lines(&["Publisher: A".to_string(), "Pages: 10".to_string()]);
        assert_eq!(lines, vec!["  ├─ Publisher: A", "  └─ Pages: 10"]);
    }

    #[test]
    fn empty_fields_are_hidden() {
        let mut book = BookRecord::new();
        book.author = "Jane".to_string();
        let fields = field_lines(&book);
        assert_eq!(fields, vec![("作者", "Jane")]);
    }
}
