/// Alert and loading overlays
///
/// Both are drawn on top of the page with a dimmed backdrop. The alert can
/// be dismissed by its button or a click outside; the loading card cannot.
use iced::widget::{button, center, column, container, mouse_area, opaque, stack, text};
use iced::{Alignment, Color, Element, Length};

use crate::locale;
use crate::state::data::{Alert, Loading};
use crate::state::tab::Feedback;
use crate::Message;

/// Global modal state shared by both tabs
#[derive(Debug, Default)]
pub struct Overlay {
    pub alert: Option<Alert>,
    pub loading: Option<Loading>,
}

impl Overlay {
    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }
}

impl Feedback for Overlay {
    fn show_alert(&mut self, alert: Alert) {
        self.alert = Some(alert);
    }

    fn show_loading(&mut self, loading: Loading) {
        self.loading = Some(loading);
    }

    fn hide_loading(&mut self) {
        self.loading = None;
    }
}

/// Stack `content` over `base` with a backdrop. `on_blur` fires when the
/// backdrop is clicked.
pub fn modal<'a>(
    base: Element<'a, Message>,
    content: Element<'a, Message>,
    on_blur: Option<Message>,
) -> Element<'a, Message> {
    let backdrop = mouse_area(center(opaque(content)).style(|_theme| container::Style {
        background: Some(
            Color {
                a: 0.8,
                ..Color::BLACK
            }
            .into(),
        ),
        ..container::Style::default()
    }));

    let backdrop = match on_blur {
        Some(message) => backdrop.on_press(message),
        None => backdrop,
    };

    stack![base, opaque(backdrop)].into()
}

pub fn alert_card(alert: &Alert) -> Element<'_, Message> {
    container(
        column![
            text(alert.title.as_str()).size(20),
            text(alert.message.as_str()).size(14),
            button(text(locale::ALERT_CLOSE))
                .padding([8, 24])
                .on_press(Message::DismissAlert),
        ]
        .spacing(16)
        .align_x(Alignment::Center),
    )
    .width(Length::Fixed(380.0))
    .padding(24)
    .style(container::rounded_box)
    .into()
}

pub fn loading_card(loading: &Loading) -> Element<'_, Message> {
    container(
        column![
            text("⏳").size(32),
            text(loading.title.as_str()).size(18),
            text(loading.message.as_str()).size(13),
        ]
        .spacing(12)
        .align_x(Alignment::Center),
    )
    .width(Length::Fixed(360.0))
    .padding(28)
    .style(container::rounded_box)
    .into()
}
