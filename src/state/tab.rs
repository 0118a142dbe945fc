/// One controller drives both tabs
///
/// A tab holds at most one uploaded image and one result. The two tabs only
/// differ in the inference call they make, the shape of the result and their
/// copy, which is what [`TabFlow`] supplies.
///
/// ```text
/// Empty ──select──▶ Uploaded ──submit──▶ Submitting ──complete──▶ Result
///   ▲                  ▲                                       └──▶ Error
///   └──remove/reset────┴──────────── (any state) ───────────────────┘
/// ```
///
/// Each submit is tagged with a [`Ticket`]. Selecting, removing or resetting
/// moves the ticket on, so a late completion for an image that is no longer
/// there only hides the loading modal.
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{InferenceError, MaintenanceError, SubmitError, ValidationError};
use crate::locale;
use crate::services::gemini::{InferenceClient, EXPECTED_POSE_COUNT};
use crate::state::data::{
    Alert, InlineImage, Loading, PosePrompt, SelectedFile, SystemConfig, ACCEPTED_MIME_TYPES,
};
use crate::upload::{PreviewCache, PreviewHandle};

/// Localized text a tab shows.
#[derive(Debug, Clone, Copy)]
pub struct FlowCopy {
    pub heading: &'static str,
    pub info: &'static str,
    pub submit: &'static str,
    pub loading_title: &'static str,
    pub loading_body: &'static str,
    pub missing_image: &'static str,
    pub error: &'static str,
}

/// What makes a tab one tab and not the other.
pub trait TabFlow: Send + Sync + 'static {
    type Output: Clone + Debug + Send + 'static;

    /// Name used in logs.
    const NAME: &'static str;

    const COPY: FlowCopy;

    fn run(
        client: Arc<dyn InferenceClient>,
        image: InlineImage,
    ) -> BoxFuture<'static, Result<Self::Output, InferenceError>>;

    fn accepts(mime_type: &str) -> bool {
        ACCEPTED_MIME_TYPES.contains(&mime_type)
    }

    /// Message shown when a successful result has nothing in it.
    fn empty_notice(_output: &Self::Output) -> Option<&'static str> {
        None
    }
}

/// Single style prompt for the whole image.
pub struct StyleAnalysis;

impl TabFlow for StyleAnalysis {
    type Output = String;

    const NAME: &'static str = "style_analysis";

    const COPY: FlowCopy = FlowCopy {
        heading: locale::ANALYZER_HEADING,
        info: locale::ANALYZER_INFO,
        submit: locale::ANALYZER_SUBMIT,
        loading_title: locale::ANALYZER_LOADING_TITLE,
        loading_body: locale::ANALYZER_LOADING_BODY,
        missing_image: locale::ANALYZER_MISSING_IMAGE,
        error: locale::ANALYZER_ERROR,
    };

    fn run(
        client: Arc<dyn InferenceClient>,
        image: InlineImage,
    ) -> BoxFuture<'static, Result<String, InferenceError>> {
        Box::pin(async move { client.analyze_style(&image).await })
    }
}

/// Eight pose prompts in the image's aesthetic.
pub struct PoseGeneration;

impl TabFlow for PoseGeneration {
    type Output = Vec<PosePrompt>;

    const NAME: &'static str = "pose_generation";

    const COPY: FlowCopy = FlowCopy {
        heading: locale::POSES_HEADING,
        info: locale::POSES_INFO,
        submit: locale::POSES_SUBMIT,
        loading_title: locale::POSES_LOADING_TITLE,
        loading_body: locale::POSES_LOADING_BODY,
        missing_image: locale::POSES_MISSING_IMAGE,
        error: locale::POSES_ERROR,
    };

    fn run(
        client: Arc<dyn InferenceClient>,
        image: InlineImage,
    ) -> BoxFuture<'static, Result<Vec<PosePrompt>, InferenceError>> {
        Box::pin(async move {
            let prompts = client.generate_pose_variations(&image).await?;
            if prompts.len() != EXPECTED_POSE_COUNT {
                warn!(
                    count = prompts.len(),
                    expected = EXPECTED_POSE_COUNT,
                    "model returned an unexpected number of poses"
                );
            }
            Ok(prompts)
        })
    }

    fn empty_notice(output: &Vec<PosePrompt>) -> Option<&'static str> {
        output.is_empty().then_some(locale::POSES_EMPTY)
    }
}

/// Modal surface the controller reports through.
pub trait Feedback {
    fn show_alert(&mut self, alert: Alert);
    fn show_loading(&mut self, loading: Loading);
    fn hide_loading(&mut self);
}

/// Collaborators shared by both tabs.
#[derive(Clone)]
pub struct TabContext {
    pub inference: Arc<dyn InferenceClient>,
    pub previews: Arc<PreviewCache>,
    pub config: watch::Receiver<SystemConfig>,
}

/// An accepted upload with its on-disk preview.
#[derive(Debug)]
pub struct UploadedImage {
    pub file: SelectedFile,
    pub preview: PreviewHandle,
}

#[derive(Debug)]
pub enum TabState<T> {
    Empty,
    Uploaded(UploadedImage),
    Submitting(UploadedImage),
    Result { image: UploadedImage, output: T },
    Error(UploadedImage),
}

impl<T> Default for TabState<T> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<T> TabState<T> {
    pub fn image(&self) -> Option<&UploadedImage> {
        match self {
            Self::Empty => None,
            Self::Uploaded(image)
            | Self::Submitting(image)
            | Self::Error(image)
            | Self::Result { image, .. } => Some(image),
        }
    }
}

/// Identifies one submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// A started request. The shell runs `task` and hands the result back to
/// [`TabController::complete`] with `ticket`.
pub struct Submission<T> {
    pub ticket: Ticket,
    pub task: BoxFuture<'static, Result<T, InferenceError>>,
}

pub struct TabController<F: TabFlow> {
    ctx: TabContext,
    state: TabState<F::Output>,
    ticket: u64,
    _flow: PhantomData<F>,
}

impl<F: TabFlow> TabController<F> {
    pub fn new(ctx: TabContext) -> Self {
        Self {
            ctx,
            state: TabState::Empty,
            ticket: 0,
            _flow: PhantomData,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &TabState<F::Output> {
        &self.state
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.state.image()
    }

    pub fn output(&self) -> Option<&F::Output> {
        match &self.state {
            TabState::Result { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, TabState::Submitting(_))
    }

    pub fn api_enabled(&self) -> bool {
        self.ctx.config.borrow().api_enabled
    }

    pub fn copy(&self) -> FlowCopy {
        F::COPY
    }

    fn next_ticket(&mut self) {
        self.ticket = self.ticket.wrapping_add(1);
    }

    /// Accept `file` as this tab's image, replacing any previous one.
    pub fn select_file(
        &mut self,
        file: SelectedFile,
        feedback: &mut dyn Feedback,
    ) -> Result<(), ValidationError> {
        if !F::accepts(&file.mime_type) {
            warn!(tab = F::NAME, file = %file.name, mime = %file.mime_type, "upload rejected");
            feedback.show_alert(Alert::new(
                locale::INVALID_FORMAT_TITLE,
                locale::INVALID_FORMAT_BODY,
            ));
            return Err(ValidationError::UnsupportedMimeType {
                mime_type: file.mime_type,
            });
        }

        let preview = match self.ctx.previews.create(&file) {
            Ok(preview) => preview,
            Err(e) => {
                warn!(tab = F::NAME, file = %file.name, error = %e, "preview could not be written");
                feedback.show_alert(Alert::new(locale::UNREADABLE_TITLE, locale::UNREADABLE_BODY));
                return Err(ValidationError::Unreadable {
                    reason: e.to_string(),
                });
            }
        };

        info!(tab = F::NAME, file = %file.name, bytes = file.bytes.len(), "📷 image selected");
        self.next_ticket();
        self.state = TabState::Uploaded(UploadedImage { file, preview });
        Ok(())
    }

    /// Drop the image and any result.
    pub fn remove_file(&mut self) {
        debug!(tab = F::NAME, "image removed");
        self.next_ticket();
        self.state = TabState::Empty;
    }

    pub fn reset(&mut self) {
        debug!(tab = F::NAME, "tab reset");
        self.next_ticket();
        self.state = TabState::Empty;
    }

    /// Start an inference request for the current image.
    pub fn submit(
        &mut self,
        feedback: &mut dyn Feedback,
    ) -> Result<Submission<F::Output>, SubmitError> {
        if self.is_submitting() {
            return Err(SubmitError::Busy);
        }
        if !self.api_enabled() {
            feedback.show_alert(Alert::new(locale::MAINTENANCE_TITLE, locale::MAINTENANCE_BODY));
            return Err(MaintenanceError.into());
        }

        let image = match std::mem::take(&mut self.state) {
            TabState::Empty => {
                feedback.show_alert(Alert::new(locale::MISSING_IMAGE_TITLE, F::COPY.missing_image));
                return Err(ValidationError::MissingImage.into());
            }
            TabState::Uploaded(image)
            | TabState::Submitting(image)
            | TabState::Error(image)
            | TabState::Result { image, .. } => image,
        };

        feedback.show_loading(Loading {
            title: F::COPY.loading_title.to_string(),
            message: F::COPY.loading_body.to_string(),
        });

        let inline = image.file.to_inline();
        self.state = TabState::Submitting(image);
        self.next_ticket();

        info!(tab = F::NAME, ticket = self.ticket, "request started");
        Ok(Submission {
            ticket: Ticket(self.ticket),
            task: F::run(self.ctx.inference.clone(), inline),
        })
    }

    /// Apply a finished request. Returns whether it still belonged to the
    /// current image.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<F::Output, InferenceError>,
        feedback: &mut dyn Feedback,
    ) -> bool {
        feedback.hide_loading();

        if ticket.0 != self.ticket || !self.is_submitting() {
            debug!(tab = F::NAME, ticket = ticket.0, current = self.ticket, "stale result dropped");
            return false;
        }

        let TabState::Submitting(image) = std::mem::take(&mut self.state) else {
            return false;
        };

        self.state = match result {
            Ok(output) => {
                info!(tab = F::NAME, "✨ result ready");
                if let Some(notice) = F::empty_notice(&output) {
                    warn!(tab = F::NAME, "result is empty");
                    feedback.show_alert(Alert::new(locale::ERROR_TITLE, notice));
                }
                TabState::Result { image, output }
            }
            Err(e) => {
                warn!(tab = F::NAME, error = %e, cause = %e.failure(), "request failed");
                feedback.show_alert(Alert::new(locale::ERROR_TITLE, F::COPY.error));
                TabState::Error(image)
            }
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use async_trait::async_trait;
    use crate::error::InferenceFailure;

    #[derive(Default)]
    struct Recorder {
        alerts: Vec<Alert>,
        loading: Option<Loading>,
        hides: usize,
    }

    impl Feedback for Recorder {
        fn show_alert(&mut self, alert: Alert) {
            self.alerts.push(alert);
        }
        fn show_loading(&mut self, loading: Loading) {
            self.loading = Some(loading);
        }
        fn hide_loading(&mut self) {
            self.loading = None;
            self.hides += 1;
        }
    }

    #[derive(Default)]
    struct FakeClient {
        calls: AtomicUsize,
        seen: Mutex<Vec<InlineImage>>,
        fail: bool,
        poses: Vec<PosePrompt>,
    }

    #[async_trait]
    impl InferenceClient for FakeClient {
        async fn analyze_style(&self, image: &InlineImage) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(image.clone());
            if self.fail {
                Err(InferenceError::Analysis(InferenceFailure::EmptyResponse))
            } else {
                Ok("soft golden hour, film grain".to_string())
            }
        }

        async fn generate_pose_variations(
            &self,
            _image: &InlineImage,
        ) -> Result<Vec<PosePrompt>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(InferenceError::PoseGeneration(InferenceFailure::Malformed("x".into())))
            } else {
                Ok(self.poses.clone())
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        previews: Arc<PreviewCache>,
        client: Arc<FakeClient>,
        config: watch::Sender<SystemConfig>,
    }

    impl Fixture {
        fn new(client: FakeClient) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let previews = Arc::new(PreviewCache::open(dir.path().join("previews")).unwrap());
            let (config, _) = watch::channel(SystemConfig::default());
            Self {
                _dir: dir,
                previews,
                client: Arc::new(client),
                config,
            }
        }

        fn controller<F: TabFlow>(&self) -> TabController<F> {
            TabController::new(TabContext {
                inference: self.client.clone(),
                previews: self.previews.clone(),
                config: self.config.subscribe(),
            })
        }

        fn preview_count(&self) -> usize {
            std::fs::read_dir(self.previews.dir()).unwrap().count()
        }

        fn calls(&self) -> usize {
            self.client.calls.load(Ordering::SeqCst)
        }
    }

    fn jpeg(name: &str) -> SelectedFile {
        SelectedFile::new(name, "image/jpeg", b"\xff\xd8\xff\xe0jpeg".to_vec())
    }

    #[test]
    fn test_unsupported_mime_leaves_state() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();

        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();
        let err = tab
            .select_file(SelectedFile::new("notes.gif", "image/gif", vec![1]), &mut fb)
            .unwrap_err();

        assert!(matches!(err, ValidationError::UnsupportedMimeType { .. }));
        assert_eq!(tab.image().unwrap().file.name, "a.jpg");
        assert_eq!(fb.alerts.len(), 1);
        assert_eq!(fb.alerts[0].title, locale::INVALID_FORMAT_TITLE);
        assert_eq!(fx.preview_count(), 1);
    }

    #[test]
    fn test_empty_mime_rejected() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<PoseGeneration>();
        let mut fb = Recorder::default();

        assert!(tab
            .select_file(SelectedFile::new("mystery", "", vec![0]), &mut fb)
            .is_err());
        assert!(matches!(tab.state(), TabState::Empty));
    }

    #[test]
    fn test_replace_releases_previous_preview() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();

        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();
        let first = tab.image().unwrap().preview.path().to_path_buf();
        assert!(first.exists());

        tab.select_file(jpeg("b.jpg"), &mut fb).unwrap();
        let second = tab.image().unwrap().preview.path().to_path_buf();
        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(fx.preview_count(), 1);

        tab.remove_file();
        assert!(!second.exists());
        assert_eq!(fx.preview_count(), 0);
    }

    #[test]
    fn test_submit_while_disabled_never_calls_client() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        fx.config.send_replace(SystemConfig {
            api_enabled: false,
            ..SystemConfig::default()
        });

        let err = tab.submit(&mut fb).err().unwrap();
        assert_eq!(err, SubmitError::Maintenance(MaintenanceError));
        assert_eq!(fb.alerts[0].title, locale::MAINTENANCE_TITLE);
        assert!(fb.loading.is_none());
        assert!(matches!(tab.state(), TabState::Uploaded(_)));
        assert_eq!(fx.calls(), 0);
    }

    #[test]
    fn test_submit_without_image_never_calls_client() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<PoseGeneration>();
        let mut fb = Recorder::default();

        let err = tab.submit(&mut fb).err().unwrap();
        assert_eq!(err, SubmitError::Validation(ValidationError::MissingImage));
        assert_eq!(fb.alerts[0].message, locale::POSES_MISSING_IMAGE);
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_success_hides_loading_and_stores_result() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let submission = tab.submit(&mut fb).unwrap();
        assert!(tab.is_submitting());
        assert_eq!(
            fb.loading.as_ref().map(|l| l.title.as_str()),
            Some(locale::ANALYZER_LOADING_TITLE)
        );
        assert!(matches!(tab.submit(&mut fb), Err(SubmitError::Busy)));

        let result = submission.task.await;
        assert!(tab.complete(submission.ticket, result, &mut fb));

        assert!(fb.loading.is_none());
        assert!(fb.alerts.is_empty());
        assert_eq!(tab.output().map(String::as_str), Some("soft golden hour, film grain"));
        assert_eq!(fx.calls(), 1);

        let seen = fx.client.seen.lock().unwrap();
        assert_eq!(seen[0].mime_type, "image/jpeg");
        assert!(!seen[0].data.starts_with("data:"));
    }

    #[tokio::test]
    async fn test_failure_alerts_and_keeps_image() {
        let fx = Fixture::new(FakeClient {
            fail: true,
            ..FakeClient::default()
        });
        let mut tab = fx.controller::<PoseGeneration>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let submission = tab.submit(&mut fb).unwrap();
        let result = submission.task.await;
        tab.complete(submission.ticket, result, &mut fb);

        assert!(fb.loading.is_none());
        assert_eq!(fb.alerts.len(), 1);
        assert_eq!(fb.alerts[0].title, locale::ERROR_TITLE);
        assert_eq!(fb.alerts[0].message, locale::POSES_ERROR);
        assert!(matches!(tab.state(), TabState::Error(_)));
        assert_eq!(tab.image().unwrap().file.name, "a.jpg");
    }

    #[tokio::test]
    async fn test_empty_pose_list_alerts_and_keeps_result() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<PoseGeneration>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let submission = tab.submit(&mut fb).unwrap();
        assert!(tab.complete(submission.ticket, Ok(Vec::new()), &mut fb));

        assert!(fb.loading.is_none());
        assert_eq!(fb.alerts.len(), 1);
        assert_eq!(fb.alerts[0].message, locale::POSES_EMPTY);
        assert_eq!(tab.output().map(Vec::len), Some(0));
        assert_eq!(tab.image().unwrap().file.name, "a.jpg");
    }

    #[tokio::test]
    async fn test_resubmit_clears_prior_result() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let first = tab.submit(&mut fb).unwrap();
        let result = first.task.await;
        tab.complete(first.ticket, result, &mut fb);
        assert!(tab.output().is_some());

        let _second = tab.submit(&mut fb).unwrap();
        assert!(tab.output().is_none());
    }

    #[tokio::test]
    async fn test_stale_completion_after_reset_is_ignored() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let submission = tab.submit(&mut fb).unwrap();
        tab.reset();
        let result = submission.task.await;

        assert!(!tab.complete(submission.ticket, result, &mut fb));
        assert_eq!(fb.hides, 1);
        assert!(matches!(tab.state(), TabState::Empty));
    }

    #[tokio::test]
    async fn test_stale_completion_after_new_upload_is_ignored() {
        let fx = Fixture::new(FakeClient::default());
        let mut tab = fx.controller::<StyleAnalysis>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let submission = tab.submit(&mut fb).unwrap();
        tab.select_file(jpeg("b.jpg"), &mut fb).unwrap();
        let result = submission.task.await;

        assert!(!tab.complete(submission.ticket, result, &mut fb));
        assert!(matches!(tab.state(), TabState::Uploaded(_)));
        assert_eq!(tab.image().unwrap().file.name, "b.jpg");
    }

    #[tokio::test]
    async fn test_pose_count_passed_through() {
        let poses = vec![
            PosePrompt {
                title: "Candid".into(),
                prompt: "walk shot".into(),
            };
            3
        ];
        let fx = Fixture::new(FakeClient {
            poses,
            ..FakeClient::default()
        });
        let mut tab = fx.controller::<PoseGeneration>();
        let mut fb = Recorder::default();
        tab.select_file(jpeg("a.jpg"), &mut fb).unwrap();

        let submission = tab.submit(&mut fb).unwrap();
        let result = submission.task.await;
        tab.complete(submission.ticket, result, &mut fb);

        assert_eq!(tab.output().map(Vec::len), Some(3));
    }

    #[test]
    fn test_tabs_share_config_but_not_state() {
        let fx = Fixture::new(FakeClient::default());
        let mut analyzer = fx.controller::<StyleAnalysis>();
        let poses = fx.controller::<PoseGeneration>();
        let mut fb = Recorder::default();

        analyzer.select_file(jpeg("a.jpg"), &mut fb).unwrap();
        assert!(poses.image().is_none());

        fx.config.send_replace(SystemConfig {
            api_enabled: false,
            ..SystemConfig::default()
        });
        assert!(!analyzer.api_enabled());
        assert!(!poses.api_enabled());
    }
}
