//! 封面预览：后台下载封面图并转成 ASCII 字符画。

use super::*;

use url::Url;

use crate::network_parser::network::HttpMethod;

pub(super) fn open_cover(app: &mut App) {
    let Some(cover) = app.detail.as_ref().and_then(|v| v.book.cover.clone()) else {
        app.status = "这本书没有封面".to_string();
        return;
    };
    app.cover_generation += 1;
    app.cover_lines.clear();
    app.mode = Mode::Cover;
    start_spinner(app, "加载封面");

    let generation = app.cover_generation;
    let (term_w, term_h) = crossterm::terminal::size().unwrap_or((80, 24));
    let repo = Arc::clone(&app.repo);
    let tx = app.worker_tx.clone();
    thread::spawn(move || {
        let result = fetch_cover(repo.as_ref(), &cover, term_w, term_h);
        let _ = tx.send(WorkerMsg::CoverReady { generation, result });
    });
}

pub(super) fn handle_key_cover(app: &mut App, key: KeyEvent) {
    if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter) {
        // 迟到的封面结果直接丢弃
        app.cover_generation += 1;
        stop_spinner(app);
        app.mode = Mode::Detail;
        app.status = "返回详情".to_string();
    }
}

pub(super) fn draw_cover(frame: &mut ratatui::Frame, app: &mut App) {
    let area = super::centered_rect(90, 90, frame.size());
    let title = app
        .detail
        .as_ref()
        .map(|v| format!("《{}》", v.book.title))
        .unwrap_or_else(|| "封面预览".to_string());
    let lines: Vec<Line> = if app.cover_lines.is_empty() {
        vec![Line::from("加载中…")]
    } else {
        app.cover_lines.iter().cloned().map(Line::from).collect()
    };
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .alignment(Alignment::Center),
        area,
    );
}

fn fetch_cover(
    repo: &dyn Repository,
    url: &Url,
    term_w: u16,
    term_h: u16,
) -> Result<Vec<String>, String> {
    let resp = repo
        .fetcher()
        .fetch(url, HttpMethod::Get, None)
        .map_err(|e| e.to_string())?;
    render_ascii(&resp.body, term_w, term_h)
}

#[cfg(feature = "cover")]
fn render_ascii(bytes: &[u8], term_w: u16, term_h: u16) -> Result<Vec<String>, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("解码封面失败: {e}"))?;
    Ok(image_to_ascii(&img, term_w, term_h))
}

#[cfg(not(feature = "cover"))]
fn render_ascii(_bytes: &[u8], _term_w: u16, _term_h: u16) -> Result<Vec<String>, String> {
    Err("当前构建未启用封面预览（cover 特性）".to_string())
}

/// 灰度映射到字符梯度；终端字符高约为宽的两倍，纵向减半。
#[cfg(feature = "cover")]
fn image_to_ascii(img: &image::DynamicImage, term_w: u16, term_h: u16) -> Vec<String> {
    use image::GenericImageView;
    use image::imageops::FilterType;

    const PALETTE: &[u8] = b" .:-=+*#%@";
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let max_width = u32::from(term_w.saturating_sub(8).max(16));
    let max_height = u32::from(term_h.saturating_sub(6).max(8));
    let target_width = max_width.min(w);
    let target_height = (h * target_width / w / 2).clamp(1, max_height);

    let gray = img
        .resize_exact(target_width.max(1), target_height, FilterType::Triangle)
        .to_luma8();
    (0..gray.height())
        .map(|y| {
            (0..gray.width())
                .map(|x| {
                    let v = f32::from(gray.get_pixel(x, y)[0]) / 255.0;
                    let idx = (v * (PALETTE.len() - 1) as f32).round() as usize;
                    char::from(PALETTE[idx.min(PALETTE.len() - 1)])
                })
                .collect()
        })
        .collect()
}

#[cfg(all(test, feature = "cover"))]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::super::tests::{Harness, harness, key, press, pump};
    use super::*;
    use crate::network_parser::network::test_server::Route;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, _| {
            if x < w / 2 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn open_detail(h: &mut Harness) {
        handle_key(&mut h.app, key(KeyCode::Enter));
        pump(&mut h.app);
        assert_eq!(h.app.mode, Mode::Detail);
    }

    #[test]
    fn dark_and_light_halves_map_to_palette_ends() {
        let img = image::load_from_memory(&png(40, 40)).unwrap();
        let lines = image_to_ascii(&img, 48, 40);
        assert!(!lines.is_empty());
        let first = &lines[0];
        assert!(first.starts_with(' '));
        assert!(first.ends_with('@'));
    }

    #[test]
    fn cover_view_loads_and_returns_to_detail() {
        let mut h = harness(vec![("/covers/1234.jpg", Route::bytes(png(32, 48)))]);
        open_detail(&mut h);
        press(&mut h.app, "c");
        assert_eq!(h.app.mode, Mode::Cover);
        pump(&mut h.app);
        assert!(!h.app.cover_lines.is_empty());
        assert!(!h.app.cover_lines[0].starts_with("封面加载失败"));

        press(&mut h.app, "q");
        assert_eq!(h.app.mode, Mode::Detail);
        assert!(!h.app.should_quit);
    }

    #[test]
    fn broken_cover_shows_error_line() {
        let mut h = harness(vec![("/covers/1234.jpg", Route::bytes(b"not an image".to_vec()))]);
        open_detail(&mut h);
        press(&mut h.app, "c");
        pump(&mut h.app);
        assert!(h.app.cover_lines[0].starts_with("封面加载失败"));
    }
}
