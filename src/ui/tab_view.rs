/// Tab pages: upload area, submit row and results
use iced::widget::image::Handle;
use iced::widget::{button, column, container, horizontal_space, image, row, text, Column};
use iced::{Alignment, Element, Length};

use crate::locale;
use crate::state::data::{ActiveTab, PosePrompt};
use crate::state::tab::{PoseGeneration, StyleAnalysis, TabController, TabFlow, UploadedImage};
use crate::Message;

pub fn analyzer(tab: &TabController<StyleAnalysis>) -> Element<'_, Message> {
    let result: Option<Element<'_, Message>> =
        tab.output().filter(|prompt| !prompt.is_empty()).map(|prompt| {
            column![
                row![
                    text(locale::ANALYZER_RESULT).size(16),
                    horizontal_space(),
                    copy_button(prompt),
                ]
                .align_y(Alignment::Center),
                container(text(prompt.as_str()).size(14))
                    .padding(16)
                    .width(Length::Fill)
                    .style(container::rounded_box),
            ]
            .spacing(10)
            .into()
        });

    page(ActiveTab::Analyzer, tab, result)
}

pub fn poses(tab: &TabController<PoseGeneration>) -> Element<'_, Message> {
    // An empty list still gets its heading so the count reads 0
    let result: Option<Element<'_, Message>> = tab.output().map(|poses| {
        let cards = poses
            .iter()
            .enumerate()
            .fold(Column::new().spacing(12), |cards, (index, pose)| {
                cards.push(pose_card(index, pose))
            });

        column![text(locale::poses_result_heading(poses.len())).size(16), cards]
            .spacing(12)
            .into()
    });

    page(ActiveTab::Poses, tab, result)
}

/// Layout shared by both tabs
fn page<'a, F: TabFlow>(
    which: ActiveTab,
    tab: &'a TabController<F>,
    result: Option<Element<'a, Message>>,
) -> Element<'a, Message> {
    let copy = tab.copy();
    let enabled = tab.api_enabled();

    // Offline still lets the press through so the maintenance alert shows
    let label = if enabled { copy.submit } else { locale::SYSTEM_OFFLINE };
    let pressable = tab.image().is_some() && !tab.is_submitting();
    let submit = button(text(label).width(Length::Fill).align_x(Alignment::Center))
        .padding(14)
        .width(Length::Fill)
        .style(if enabled { button::primary } else { button::secondary })
        .on_press_maybe(pressable.then_some(Message::Submit(which)));

    let reset = button(text("↺").size(18))
        .padding([12, 16])
        .style(button::secondary)
        .on_press(Message::Reset(which));

    column![
        text(copy.heading).size(20),
        text(copy.info).size(13),
        upload_area(which, tab.image()),
        row![submit, reset].spacing(12),
    ]
    .push_maybe(result)
    .spacing(20)
    .into()
}

fn upload_area(which: ActiveTab, uploaded: Option<&UploadedImage>) -> Element<'_, Message> {
    let content: Element<'_, Message> = match uploaded {
        Some(uploaded) => column![
            image(Handle::from_path(uploaded.preview.path())).height(Length::Fixed(280.0)),
            row![
                text(uploaded.file.name.as_str()).size(13),
                horizontal_space(),
                button(text(locale::UPLOAD_REMOVE).size(13))
                    .style(button::danger)
                    .on_press(Message::RemoveImage(which)),
            ]
            .align_y(Alignment::Center),
        ]
        .spacing(10)
        .align_x(Alignment::Center)
        .into(),
        None => column![
            button(text(locale::UPLOAD_PICK))
                .padding(12)
                .on_press(Message::PickImage(which)),
            text(locale::UPLOAD_HINT).size(12),
        ]
        .spacing(8)
        .align_x(Alignment::Center)
        .into(),
    };

    container(content)
        .padding(20)
        .width(Length::Fill)
        .center_x(Length::Fill)
        .style(container::bordered_box)
        .into()
}

fn pose_card(index: usize, pose: &PosePrompt) -> Element<'_, Message> {
    container(
        column![
            row![
                text(format!("{:02}", index + 1)).size(12),
                text(pose.title.as_str()).size(15),
                horizontal_space(),
                copy_button(&pose.prompt),
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            text(pose.prompt.as_str()).size(13),
        ]
        .spacing(8),
    )
    .padding(14)
    .width(Length::Fill)
    .style(container::rounded_box)
    .into()
}

fn copy_button<'a>(content: &str) -> Element<'a, Message> {
    button(text(locale::COPY).size(12))
        .padding([4, 10])
        .style(button::secondary)
        .on_press(Message::Copy(content.to_string()))
        .into()
}
