use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, StatefulWidget, Widget, Wrap},
};
use sitefeed_widgets::{
    color::{contrast_text_color, css_to_rgb},
    dom::{Document, Fragment, Notice, ScrollMetrics},
};

/// Height of one terminal row in the scroll units the widgets expect.
pub const ROW_HEIGHT: u32 = 20;

/// Scrollable view over a [`Document`] snapshot.
#[derive(Debug, Default)]
pub struct FeedView {
    /// First visible row.
    offset: usize,
    /// Rows visible at the last draw.
    viewport: u16,
    /// Rows of content at the last draw.
    content: usize,
}

impl FeedView {
    pub fn scroll_down(&mut self, rows: usize) {
        self.offset = (self.offset + rows).min(self.max_offset());
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.offset = self.offset.saturating_sub(rows);
    }

    pub fn scroll_to_top(&mut self) {
        self.offset = 0;
    }

    pub fn page(&self) -> usize {
        usize::from(self.viewport.max(1))
    }

    fn max_offset(&self) -> usize {
        self.content.saturating_sub(usize::from(self.viewport))
    }

    /// Scroll position as the widgets measure it.
    pub fn metrics(&self) -> ScrollMetrics {
        let px = |rows: usize| u32::try_from(rows).unwrap_or(u32::MAX).saturating_mul(ROW_HEIGHT);
        ScrollMetrics {
            scroll_top: px(self.offset),
            client_height: px(usize::from(self.viewport)),
            scroll_height: px(self.content),
        }
    }
}

/// A [`FeedView`] drawing `document` inside a titled border.
pub struct Feed<'a> {
    pub document: &'a Document,
    pub title: &'a str,
    pub focused: bool,
    /// Show the newest content at the bottom, following new messages.
    pub follow_bottom: bool,
}

impl StatefulWidget for Feed<'_> {
    type State = FeedView;

    fn render(self, area: Rect, buffer: &mut Buffer, view: &mut FeedView) {
        let mut title = self.title.to_owned();
        if self.document.is_loading() {
            title.push_str(" (loading…)");
        }
        let border_style = if self.focused {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border_style);
        let inner = block.inner(area);
        block.render(area, buffer);
        view.viewport = inner.height;

        if let Some(notice) = self.document.notice() {
            view.content = 0;
            view.offset = 0;
            notice_paragraph(notice).render(inner, buffer);
            return;
        }

        let items: Vec<ListItem<'static>> =
            self.document.fragments().iter().map(fragment_item).collect();
        view.content = items.iter().map(ListItem::height).sum();
        if self.follow_bottom && self.document.is_pinned_to_bottom() {
            view.offset = view.max_offset();
        } else {
            view.offset = view.offset.min(view.max_offset());
        }
        let mut skip = view.offset;
        let visible = items.into_iter().skip_while(|item| {
            if skip >= item.height() {
                skip -= item.height();
                true
            } else {
                false
            }
        });
        Widget::render(List::new(visible), inner, buffer);
    }
}

fn notice_paragraph(notice: &Notice) -> Paragraph<'static> {
    let text = match notice {
        Notice::Empty(text) => Text::from(text.clone()).style(Style::default().fg(Color::Gray)),
        Notice::Error(panel) => Text::from(vec![
            Line::styled(panel.title.clone(), Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Line::from(panel.detail.clone()),
            Line::from(""),
            Line::styled("press r to retry", Style::default().fg(Color::Gray)),
        ]),
    };
    Paragraph::new(text).wrap(Wrap { trim: true }).centered()
}

fn rgb(css: &str) -> Option<Color> {
    css_to_rgb(css).map(|(r, g, b)| Color::Rgb(r, g, b))
}

fn fragment_item(fragment: &Fragment) -> ListItem<'static> {
    let Some(accent) = fragment.accent.as_deref() else {
        return ListItem::new(Text::from(fragment.text.clone()));
    };
    let Some((name, text)) = fragment.text.split_once(": ") else {
        return ListItem::new(Text::from(fragment.text.clone()));
    };
    let mut label = Style::default();
    if let Some(bg) = rgb(accent) {
        label = label.bg(bg);
    }
    if let Some(fg) = rgb(&contrast_text_color(accent)) {
        label = label.fg(fg);
    } else {
        label = label.fg(Color::White);
    }
    ListItem::new(Line::from(vec![
        Span::styled(format!(" {name} "), label),
        Span::raw(format!(" {text}")),
    ]))
}
