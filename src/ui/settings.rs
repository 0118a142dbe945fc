/// Admin settings panel
///
/// Anonymous users see a login form. Admins see the system status, the
/// ON/OFF switch with its last-change metadata, and a logout button.
use iced::widget::{button, column, container, horizontal_space, row, text, text_input, Column};
use iced::{Alignment, Element, Length, Task};
use tracing::{error, warn};

use crate::error::{AuthError, ConfigWriteError};
use crate::locale;
use crate::services::auth::{Identity, IdentityGate};
use crate::services::config_store::ConfigStoreAdapter;
use crate::state::data::SystemConfig;
use crate::Message;

#[derive(Debug, Clone)]
pub enum Event {
    Open,
    Close,
    EmailChanged(String),
    PasswordChanged(String),
    Login,
    LoginDone(Result<(), AuthError>),
    Logout,
    LogoutDone(Result<(), AuthError>),
    SetEnabled(bool),
    WriteDone(Result<(), ConfigWriteError>),
}

/// Form and in-flight state of the panel
#[derive(Debug, Default)]
pub struct SettingsPanel {
    open: bool,
    email: String,
    password: String,
    error: Option<String>,
    logging_in: bool,
    writing: bool,
}

impl SettingsPanel {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_writing(&self) -> bool {
        self.writing
    }

    pub fn update(
        &mut self,
        event: Event,
        gate: &IdentityGate,
        store: &ConfigStoreAdapter,
        identity: &Identity,
    ) -> Task<Event> {
        match event {
            Event::Open => {
                self.open = true;
                self.email.clear();
                self.password.clear();
                self.error = None;
                Task::none()
            }
            Event::Close => {
                self.open = false;
                self.password.clear();
                Task::none()
            }
            Event::EmailChanged(email) => {
                self.email = email;
                Task::none()
            }
            Event::PasswordChanged(password) => {
                self.password = password;
                Task::none()
            }
            Event::Login => {
                if self.logging_in {
                    return Task::none();
                }
                self.logging_in = true;
                self.error = None;

                let gate = gate.clone();
                let email = self.email.clone();
                let password = self.password.clone();
                Task::perform(
                    async move { gate.login(&email, &password).await },
                    Event::LoginDone,
                )
            }
            Event::LoginDone(result) => {
                self.logging_in = false;
                self.password.clear();
                if let Err(e) = result {
                    self.error = Some(e.user_message().to_string());
                }
                Task::none()
            }
            Event::Logout => {
                self.error = None;
                let gate = gate.clone();
                Task::perform(async move { gate.logout().await }, Event::LogoutDone)
            }
            Event::LogoutDone(result) => {
                if let Err(e) = result {
                    // Still a guest; the shell shows the configuration banner
                    error!(error = %e, "anonymous session not restored after logout");
                }
                Task::none()
            }
            Event::SetEnabled(enabled) => {
                if self.writing {
                    return Task::none();
                }
                match store.set_enabled(identity, enabled) {
                    Ok(pending) => {
                        self.writing = true;
                        self.error = None;
                        let gate = gate.clone();
                        Task::perform(async move { pending.send(&gate).await }, Event::WriteDone)
                    }
                    Err(e) => {
                        warn!(error = %e, "config toggle refused");
                        self.error = Some(locale::SETTINGS_NOT_ADMIN.to_string());
                        Task::none()
                    }
                }
            }
            Event::WriteDone(result) => {
                self.writing = false;
                if result.is_err() {
                    self.error = Some(locale::SETTINGS_WRITE_FAILED.to_string());
                }
                Task::none()
            }
        }
    }
}

pub fn view<'a>(
    panel: &'a SettingsPanel,
    identity: &'a Identity,
    config: &'a SystemConfig,
) -> Element<'a, Message> {
    let (title, body) = if identity.is_admin() {
        (locale::SETTINGS_ADMIN_TITLE, admin_view(panel, identity, config))
    } else {
        (locale::SETTINGS_LOCKED_TITLE, login_view(panel))
    };

    let card = container(
        column![
            row![
                text(title).size(20),
                horizontal_space(),
                button(text("✕"))
                    .style(button::text)
                    .on_press(Event::Close),
            ]
            .align_y(Alignment::Center),
            body,
        ]
        .spacing(18),
    )
    .width(Length::Fixed(420.0))
    .padding(24)
    .style(container::rounded_box);

    Element::from(card).map(Message::Settings)
}

fn login_view(panel: &SettingsPanel) -> Element<'_, Event> {
    let label = if panel.logging_in { "..." } else { locale::SETTINGS_LOGIN };

    Column::new()
        .push(text(locale::SETTINGS_LOGIN_PROMPT).size(14))
        .push(
            text_input(locale::SETTINGS_EMAIL, &panel.email)
                .on_input(Event::EmailChanged)
                .padding(10),
        )
        .push(
            text_input(locale::SETTINGS_PASSWORD, &panel.password)
                .on_input(Event::PasswordChanged)
                .on_submit(Event::Login)
                .secure(true)
                .padding(10),
        )
        .push_maybe(error_line(panel))
        .push(
            button(text(label).width(Length::Fill).align_x(Alignment::Center))
                .padding(12)
                .width(Length::Fill)
                .on_press_maybe((!panel.logging_in).then_some(Event::Login)),
        )
        .spacing(12)
        .into()
}

fn admin_view<'a>(
    panel: &'a SettingsPanel,
    identity: &'a Identity,
    config: &'a SystemConfig,
) -> Element<'a, Event> {
    let status = if config.api_enabled {
        text(locale::SETTINGS_STATUS_ON).style(text::success)
    } else {
        text(locale::SETTINGS_STATUS_OFF).style(text::danger)
    };

    let idle = !panel.is_writing();
    let toggle = if config.api_enabled {
        button(text(locale::SETTINGS_TURN_OFF).width(Length::Fill).align_x(Alignment::Center))
            .style(button::danger)
            .on_press_maybe(idle.then_some(Event::SetEnabled(false)))
    } else {
        button(text(locale::SETTINGS_TURN_ON).width(Length::Fill).align_x(Alignment::Center))
            .style(button::success)
            .on_press_maybe(idle.then_some(Event::SetEnabled(true)))
    };

    let last_change = config.last_updated.as_deref().map(|at| {
        let by = config.updated_by.as_deref().unwrap_or("Admin");
        text(format!("{}: {} ({})", locale::SETTINGS_LAST_CHANGE, at, by)).size(12)
    });

    let email = identity.session().email.as_deref().unwrap_or("Admin");

    Column::new()
        .push(text(email).size(13))
        .push(row![text(locale::SETTINGS_STATUS).size(14), horizontal_space(), status].align_y(Alignment::Center))
        .push(toggle.padding(12).width(Length::Fill))
        .push_maybe(last_change)
        .push_maybe(error_line(panel))
        .push(
            button(text(locale::SETTINGS_LOGOUT))
                .style(button::secondary)
                .on_press(Event::Logout),
        )
        .spacing(12)
        .into()
}

fn error_line(panel: &SettingsPanel) -> Option<Element<'_, Event>> {
    panel
        .error()
        .map(|message| text(message).size(13).style(text::danger).into())
}
