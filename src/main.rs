use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use iced::widget::{button, column, container, row, scrollable, text};
use iced::{event, window, Alignment, Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info};

mod config;
mod error;
mod locale;
mod services;
mod state;
mod ui;
mod upload;

use config::AppConfig;
use error::{AppError, AuthError, InferenceError, ValidationError};
use services::auth::{FirebaseAuth, Identity, IdentityGate, SessionSource};
use services::config_store::{ConfigStoreAdapter, FirestoreBackend, ListenerHandle, ListenerSlot};
use services::gemini::{GeminiClient, InferenceClient};
use state::data::{ActiveTab, Alert, PosePrompt, SelectedFile, SystemConfig};
use state::tab::{
    Feedback, PoseGeneration, StyleAnalysis, Submission, TabContext, TabController, Ticket,
};
use ui::modal::Overlay;
use ui::settings::{self, SettingsPanel};
use upload::PreviewCache;

/// Main application state
struct WarkahKasih {
    gate: IdentityGate,
    store: ConfigStoreAdapter,
    analyzer: TabController<StyleAnalysis>,
    poses: TabController<PoseGeneration>,
    active: ActiveTab,
    overlay: Overlay,
    settings: SettingsPanel,
    /// Last identity seen from the gate
    identity: Identity,
    /// Last config seen from the store
    config: SystemConfig,
    /// Anonymous sign-in failed at launch
    auth_banner: bool,
    /// Config listener for the current user
    listeners: ListenerSlot,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    TabSelected(ActiveTab),
    PickImage(ActiveTab),
    FileDropped(PathBuf),
    FileLoaded(ActiveTab, Result<SelectedFile, ValidationError>),
    RemoveImage(ActiveTab),
    Reset(ActiveTab),
    Submit(ActiveTab),
    AnalysisDone(Ticket, Result<String, InferenceError>),
    PosesDone(Ticket, Result<Vec<PosePrompt>, InferenceError>),
    Copy(String),
    DismissAlert,
    DismissAuthBanner,
    Established(Result<(), AuthError>),
    IdentityChanged(Identity),
    ConfigChanged(SystemConfig),
    ListenerAttached(u64, Arc<ListenerHandle>),
    Settings(settings::Event),
}

impl WarkahKasih {
    fn new(config: AppConfig, previews: Arc<PreviewCache>) -> (Self, Task<Message>) {
        let gate = IdentityGate::new(Arc::new(FirebaseAuth::new(&config.firebase)));
        let store = ConfigStoreAdapter::new(Arc::new(FirestoreBackend::new(&config.firebase)));
        let inference: Arc<dyn InferenceClient> = Arc::new(GeminiClient::new(config.gemini));

        let ctx = TabContext {
            inference,
            previews,
            config: store.observe(),
        };

        info!("💍 Warkah Kasih ready");

        let establish = {
            let gate = gate.clone();
            Task::perform(async move { gate.establish().await }, Message::Established)
        };

        (
            WarkahKasih {
                identity: gate.current(),
                config: store.current(),
                gate,
                store,
                analyzer: TabController::new(ctx.clone()),
                poses: TabController::new(ctx),
                active: ActiveTab::default(),
                overlay: Overlay::default(),
                settings: SettingsPanel::default(),
                auth_banner: false,
                listeners: ListenerSlot::default(),
            },
            establish,
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::TabSelected(tab) => {
                self.active = tab;
                Task::none()
            }
            Message::PickImage(tab) => {
                let picked = FileDialog::new()
                    .set_title(locale::UPLOAD_DIALOG_TITLE)
                    .add_filter("Image", &upload::loader::PICKER_EXTENSIONS)
                    .pick_file();

                match picked {
                    Some(path) => Task::perform(upload::loader::load_selected_file(path), move |result| {
                        Message::FileLoaded(tab, result)
                    }),
                    None => Task::none(),
                }
            }
            Message::FileDropped(path) => {
                let tab = self.active;
                debug!(path = %path.display(), "file dropped");
                Task::perform(upload::loader::load_selected_file(path), move |result| {
                    Message::FileLoaded(tab, result)
                })
            }
            Message::FileLoaded(tab, Ok(file)) => {
                let result = match tab {
                    ActiveTab::Analyzer => self.analyzer.select_file(file, &mut self.overlay),
                    ActiveTab::Poses => self.poses.select_file(file, &mut self.overlay),
                };
                if let Err(e) = result {
                    debug!(error = %e, "upload not accepted");
                }
                Task::none()
            }
            Message::FileLoaded(_, Err(e)) => {
                debug!(error = %e, "upload could not be loaded");
                let alert = match e {
                    ValidationError::UnsupportedMimeType { .. } => {
                        Alert::new(locale::INVALID_FORMAT_TITLE, locale::INVALID_FORMAT_BODY)
                    }
                    _ => Alert::new(locale::UNREADABLE_TITLE, locale::UNREADABLE_BODY),
                };
                self.overlay.show_alert(alert);
                Task::none()
            }
            Message::RemoveImage(tab) => {
                match tab {
                    ActiveTab::Analyzer => self.analyzer.remove_file(),
                    ActiveTab::Poses => self.poses.remove_file(),
                }
                Task::none()
            }
            Message::Reset(tab) => {
                match tab {
                    ActiveTab::Analyzer => self.analyzer.reset(),
                    ActiveTab::Poses => self.poses.reset(),
                }
                Task::none()
            }
            Message::Submit(ActiveTab::Analyzer) => match self.analyzer.submit(&mut self.overlay) {
                Ok(Submission { ticket, task }) => {
                    Task::perform(task, move |result| Message::AnalysisDone(ticket, result))
                }
                Err(e) => {
                    debug!(error = %e, "analysis not started");
                    Task::none()
                }
            },
            Message::Submit(ActiveTab::Poses) => match self.poses.submit(&mut self.overlay) {
                Ok(Submission { ticket, task }) => {
                    Task::perform(task, move |result| Message::PosesDone(ticket, result))
                }
                Err(e) => {
                    debug!(error = %e, "pose generation not started");
                    Task::none()
                }
            },
            Message::AnalysisDone(ticket, result) => {
                self.analyzer.complete(ticket, result, &mut self.overlay);
                Task::none()
            }
            Message::PosesDone(ticket, result) => {
                self.poses.complete(ticket, result, &mut self.overlay);
                Task::none()
            }
            Message::Copy(content) => iced::clipboard::write(content),
            Message::DismissAlert => {
                self.overlay.dismiss_alert();
                Task::none()
            }
            Message::DismissAuthBanner => {
                self.auth_banner = false;
                Task::none()
            }
            Message::Established(result) => {
                match result {
                    Ok(()) => self.auth_banner = false,
                    Err(e) => {
                        error!(error = %e, "anonymous sign-in failed, check the Firebase configuration");
                        self.auth_banner = true;
                    }
                }
                Task::none()
            }
            Message::IdentityChanged(identity) => {
                if identity.session().local_id != self.identity.session().local_id {
                    info!(admin = identity.is_admin(), uid = %identity.session().local_id, "identity changed");
                }
                self.identity = identity;
                self.attach_listener()
            }
            Message::ConfigChanged(config) => {
                self.config = config;
                Task::none()
            }
            Message::ListenerAttached(generation, handle) => {
                self.listeners.install(generation, handle);
                Task::none()
            }
            Message::Settings(event) => {
                if let settings::Event::LogoutDone(Err(_)) = &event {
                    self.auth_banner = true;
                }
                self.settings
                    .update(event, &self.gate, &self.store, &self.identity)
                    .map(Message::Settings)
            }
        }
    }

    /// Start a config listener when the signed-in user or role changed
    fn attach_listener(&mut self) -> Task<Message> {
        let Some(generation) = self.listeners.retarget(&self.identity) else {
            return Task::none();
        };

        let store = self.store.clone();
        let sessions: Arc<dyn SessionSource> = Arc::new(self.gate.clone());
        Task::perform(async move { Arc::new(store.attach(sessions)) }, move |handle| {
            Message::ListenerAttached(generation, handle)
        })
    }

    fn subscription(&self) -> Subscription<Message> {
        let identity = WatchStream::new(self.gate.subscribe()).map(Message::IdentityChanged);
        let config = WatchStream::new(self.store.observe()).map(Message::ConfigChanged);
        let drops = event::listen_with(|event, _status, _window| match event {
            iced::Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        Subscription::batch([
            Subscription::run_with_id("identity", identity),
            Subscription::run_with_id("system-config", config),
            drops,
        ])
    }

    /// Build the user interface
    fn view(&self) -> Element<'_, Message> {
        let mut header = column![
            text(locale::APP_KICKER).size(12),
            text(locale::APP_HEADING).size(40),
            text(locale::APP_TAGLINE).size(14),
        ]
        .spacing(6)
        .align_x(Alignment::Center);

        if !self.config.api_enabled {
            header = header.push(
                container(text(locale::SYSTEM_OFFLINE).size(12).style(text::danger))
                    .padding([4, 12])
                    .style(container::bordered_box),
            );
        }

        let gear = button(text("⚙").size(18))
            .style(button::text)
            .on_press(Message::Settings(settings::Event::Open));

        let tabs = row![
            tab_button(locale::TAB_ANALYZER, ActiveTab::Analyzer, self.active),
            tab_button(locale::TAB_POSES, ActiveTab::Poses, self.active),
        ]
        .spacing(8);

        let body = match self.active {
            ActiveTab::Analyzer => ui::tab_view::analyzer(&self.analyzer),
            ActiveTab::Poses => ui::tab_view::poses(&self.poses),
        };

        let mut content = column![row![iced::widget::horizontal_space(), gear], header]
            .spacing(16)
            .align_x(Alignment::Center);

        if self.auth_banner {
            content = content.push(
                container(
                    row![
                        column![
                            text(locale::AUTH_BANNER_TITLE).size(14),
                            text(locale::AUTH_BANNER_BODY).size(12),
                        ]
                        .spacing(4)
                        .width(Length::Fill),
                        button(text("✕"))
                            .style(button::text)
                            .on_press(Message::DismissAuthBanner),
                    ]
                    .align_y(Alignment::Center),
                )
                .padding(14)
                .width(Length::Fill)
                .style(container::bordered_box),
            );
        }

        let content = content
            .push(tabs)
            .push(body)
            .push(text(format!("{} GEMINI", locale::APP_FOOTER)).size(11));

        let page = scrollable(
            container(container(content).max_width(760.0).padding(32))
                .width(Length::Fill)
                .center_x(Length::Fill),
        );

        let mut root: Element<'_, Message> = container(page)
            .width(Length::Fill)
            .height(Length::Fill)
            .into();

        if self.settings.is_open() {
            root = ui::modal::modal(
                root,
                settings::view(&self.settings, &self.identity, &self.config),
                Some(Message::Settings(settings::Event::Close)),
            );
        }
        if let Some(loading) = &self.overlay.loading {
            root = ui::modal::modal(root, ui::modal::loading_card(loading), None);
        }
        if let Some(alert) = &self.overlay.alert {
            root = ui::modal::modal(root, ui::modal::alert_card(alert), Some(Message::DismissAlert));
        }

        root
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn tab_button(label: &str, tab: ActiveTab, active: ActiveTab) -> Element<'_, Message> {
    button(text(label).width(Length::Fill).align_x(Alignment::Center))
        .padding(12)
        .width(Length::Fill)
        .style(if tab == active { button::primary } else { button::secondary })
        .on_press(Message::TabSelected(tab))
        .into()
}

fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    let previews = Arc::new(PreviewCache::open(config.previews.resolved_dir())?);

    iced::application(locale::APP_TITLE, WarkahKasih::update, WarkahKasih::view)
        .theme(WarkahKasih::theme)
        .subscription(WarkahKasih::subscription)
        .centered()
        .run_with(move || WarkahKasih::new(config, previews))?;

    Ok(())
}
