//! Chat interactions: search, preview editing, posting and cleanup.
//!
//! Every preview goes out in two steps. The handler answers the interaction
//! straight away with a placeholder that already carries the new state, then
//! a spawned task renders the clip and edits it in along with the buttons.
use std::{collections::HashMap, sync::Arc, time::Duration};

use database::{Database, DatabaseError};
use quoteclip_core::{
    clean_sub::truncate_chars,
    duration::format_short_timestamp,
    identifiers::{MediaId, MediaIdError},
    Dialog,
};
use search::{
    parse, strip_offset, QueryError, SearchError, SearchIndex, SearchResult, Terms,
    DEFAULT_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    ffmpeg::TranscodeError,
    preview::{PreviewState, StateError, StateUpdate, UpdateLimits},
    render::{LockError, RenderError, RenderRequest, RenderedClip, Renderer},
};

mod buttons;
mod gateway;
mod help;

pub use buttons::{preview_rows, Action, Command, ComponentError, LineContext};
pub use gateway::{
    Attachment, Button, ButtonRow, ButtonStyle, Choice, GatewayError, Interaction,
    InteractionGateway, MessageRef, Modal, ModalField, Reply, User,
};
pub use help::{topics as help_topics, PUBLICATIONS_TOPIC};

/// Most gateways show at most this many autocomplete choices.
pub const MAX_CHOICES: usize = 25;
/// Gateway limit for choice names and values.
pub const MAX_CHOICE_LEN: usize = 100;
/// How far next/previous result looks into a query.
pub const NAVIGATION_PAGE_SIZE: usize = 100;

const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";
const IN_PROGRESS: &str = "you already have a render in progress";

/// Inbound events, already decoded from the chat runtime's wire format.
#[derive(Debug, Clone)]
pub enum Event {
    Autocomplete {
        interaction: Interaction,
        query: String,
    },
    Search {
        interaction: Interaction,
        query: String,
    },
    Help {
        interaction: Interaction,
        topic: String,
    },
    Delete {
        interaction: Interaction,
        target: MessageRef,
    },
    Button {
        interaction: Interaction,
        custom_id: String,
    },
    Modal {
        interaction: Interaction,
        custom_id: String,
        fields: HashMap<String, String>,
    },
}

impl Event {
    pub fn interaction(&self) -> &Interaction {
        match self {
            Event::Autocomplete { interaction, .. }
            | Event::Search { interaction, .. }
            | Event::Help { interaction, .. }
            | Event::Delete { interaction, .. }
            | Event::Button { interaction, .. }
            | Event::Modal { interaction, .. } => interaction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Shown to the user as is.
    UserInput,
    /// Logged, the user gets a short generic message.
    Backend,
    /// The same request is already being handled; ignored.
    Duplicate,
    InProgress,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Component(#[from] ComponentError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    MediaId(#[from] MediaIdError),
    #[error("no results for {0:?}")]
    NoResults(String),
    #[error("no more results")]
    NoMoreResults,
    #[error("this clip is no longer in the search results")]
    LostResult,
    #[error("unknown help topic {0:?}, try one of: {1}")]
    UnknownTopic(String, String),
    #[error("only clips you posted can be deleted")]
    NotDeletable,
    #[error("this interaction is not attached to a preview")]
    NoMessage,
    #[error("no dialog found for {0}")]
    NoDialog(MediaId),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Render(RenderError::Lock(LockError::Duplicate(_))) => {
                ErrorKind::Duplicate
            }
            ControllerError::Render(RenderError::Lock(LockError::InProgress(_))) => {
                ErrorKind::InProgress
            }
            ControllerError::Render(RenderError::NoDialog(_))
            | ControllerError::Render(RenderError::MissingOverlay(_))
            | ControllerError::Search(SearchError::Query(_)) => ErrorKind::UserInput,
            ControllerError::Render(_)
            | ControllerError::Database(_)
            | ControllerError::Search(_)
            | ControllerError::Gateway(_) => ErrorKind::Backend,
            _ => ErrorKind::UserInput,
        }
    }

    pub fn user_message(&self) -> String {
        match (self.kind(), self) {
            (ErrorKind::Duplicate, _) => String::new(),
            (ErrorKind::InProgress, _) => IN_PROGRESS.to_owned(),
            (_, ControllerError::Render(RenderError::Transcode(e @ TranscodeError::Exit { .. }))) => {
                format!("Render failed: {}", e)
            }
            (ErrorKind::Backend, _) => GENERIC_FAILURE.to_owned(),
            (ErrorKind::UserInput, e) => e.to_string(),
        }
    }
}

/// The value behind an autocomplete choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchChoice {
    #[serde(default, skip_serializing_if = "Terms::is_empty")]
    pub terms: Terms,
    pub id: MediaId,
}

impl SearchChoice {
    /// JSON, dropping the terms when the whole value would be too long for
    /// the gateway. Without terms the preview has no result navigation.
    pub fn encode(&self) -> String {
        let full = serde_json::to_string(self).unwrap_or_default();
        if full.chars().count() <= MAX_CHOICE_LEN {
            return full;
        }
        let bare = SearchChoice {
            terms: Terms::default(),
            id: self.id.clone(),
        };
        serde_json::to_string(&bare).unwrap_or_default()
    }
}

fn choice_label(result: &SearchResult) -> String {
    let content = result.content.replace('\n', " ");
    truncate_chars(&format!("[{}] {}", result.label(), content), MAX_CHOICE_LEN)
}

fn dialog_span(dialog: &[Dialog]) -> Duration {
    match (dialog.first(), dialog.last()) {
        (Some(first), Some(last)) => last.end.saturating_sub(first.start),
        _ => Duration::ZERO,
    }
}

fn originals(dialog: &[Dialog]) -> Vec<String> {
    dialog.iter().map(|d| d.content.clone()).collect()
}

/// Message body for a finished preview: a header, the lines as they will be
/// drawn, and the embedded state.
pub fn preview_content(state: &PreviewState, dialog: &[Dialog]) -> String {
    let mut out = format!(
        "**{}** {}",
        state.id.episode.publication,
        state.id.episode.label()
    );
    if let (Some(first), Some(last)) = (dialog.first(), dialog.last()) {
        out.push_str(&format!(
            " `{} - {}`",
            format_short_timestamp(first.start),
            format_short_timestamp(last.end)
        ));
    }
    let originals = originals(dialog);
    if state.settings.subs_enabled {
        for line in state.settings.subtitle_text(&originals) {
            out.push_str("\n> ");
            out.push_str(&line.replace('\n', " "));
        }
    }
    if let Some(caption) = &state.settings.caption {
        out.push_str(&format!("\ncaption: {}", caption.replace('\n', " ")));
    }
    out.push('\n');
    out.push_str(&state.encode());
    out
}

fn placeholder(verb: &str, state: &PreviewState) -> Reply {
    Reply {
        content: format!("{} `{}`…\n{}", verb, state.id, state.encode()),
        ephemeral: true,
        ..Default::default()
    }
}

fn attachment(clip: RenderedClip) -> Attachment {
    Attachment {
        file_name: clip.file_name(),
        mime_type: clip.mime_type().to_owned(),
        bytes: clip.bytes,
    }
}

struct ClipSource {
    dialog: Vec<Dialog>,
    video_file: String,
}

#[derive(Clone)]
pub struct Controller {
    db: Database,
    index: SearchIndex,
    renderer: Arc<Renderer>,
    gateway: Arc<dyn InteractionGateway>,
    bot_user_id: Option<String>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("renderer", &self.renderer)
            .field("bot_user_id", &self.bot_user_id)
            .finish()
    }
}

type Spawned = Option<JoinHandle<()>>;

impl Controller {
    pub fn new(
        db: Database,
        index: SearchIndex,
        renderer: Arc<Renderer>,
        gateway: Arc<dyn InteractionGateway>,
        bot_user_id: Option<String>,
    ) -> Controller {
        Controller {
            db,
            index,
            renderer,
            gateway,
            bot_user_id,
        }
    }

    /// Dispatch each event to its own task until the sender goes away.
    pub async fn run(self, mut events: mpsc::Receiver<Event>) {
        log::info!("controller ready");
        while let Some(event) = events.recv().await {
            let controller = self.clone();
            tokio::spawn(async move {
                controller.handle(event).await;
            });
        }
        log::info!("event stream closed, controller stopping");
    }

    /// Handle one event. Returns the background render, if one was started.
    pub async fn handle(&self, event: Event) -> Spawned {
        let interaction = event.interaction().clone();
        log::debug!(
            "interaction {} from {} ({})",
            interaction.id,
            interaction.user.name,
            interaction.user.id
        );
        let is_autocomplete = matches!(event, Event::Autocomplete { .. });
        let result = match event {
            Event::Autocomplete { interaction, query } => {
                self.autocomplete(&interaction, &query).await.map(|_| None)
            }
            Event::Search { interaction, query } => self.search(interaction, &query).await,
            Event::Help { interaction, topic } => self.help(&interaction, &topic).await.map(|_| None),
            Event::Delete {
                interaction,
                target,
            } => self.delete(&interaction, &target).await.map(|_| None),
            Event::Button {
                interaction,
                custom_id,
            } => self.button(interaction, &custom_id).await,
            Event::Modal {
                interaction,
                custom_id,
                fields,
            } => self.modal(interaction, &custom_id, &fields).await,
        };
        match result {
            Ok(spawned) => spawned,
            Err(e) => {
                self.report(&interaction, e, is_autocomplete).await;
                None
            }
        }
    }

    /// Tell the user about a failure in the handler itself, before any
    /// response went out.
    async fn report(&self, interaction: &Interaction, err: ControllerError, is_autocomplete: bool) {
        log_failure(interaction, &err);
        if is_autocomplete
            || err.kind() == ErrorKind::Duplicate
            || matches!(err, ControllerError::Gateway(_))
        {
            return;
        }
        let reply = Reply::ephemeral(err.user_message());
        if let Err(e) = self.gateway.reply(interaction, reply).await {
            log::error!("unable to report failure to {}: {}", interaction.id, e);
        }
    }

    fn suggest(&self, query: &str) -> Result<Vec<Choice>, ControllerError> {
        let (terms, offset) = strip_offset(parse(query)?);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.index.search(
            &terms,
            DEFAULT_PAGE_SIZE,
            offset.unwrap_or(0) as usize,
        )?;
        let terms = Terms(terms);
        Ok(results
            .iter()
            .take(MAX_CHOICES)
            .map(|r| Choice {
                name: choice_label(r),
                value: SearchChoice {
                    terms: terms.clone(),
                    id: r.id.clone(),
                }
                .encode(),
            })
            .collect())
    }

    async fn autocomplete(
        &self,
        interaction: &Interaction,
        query: &str,
    ) -> Result<(), ControllerError> {
        let choices = match self.suggest(query) {
            Ok(choices) => choices,
            Err(e) if e.kind() == ErrorKind::UserInput => {
                log::debug!("no suggestions for {:?}: {}", query, e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        self.gateway.autocomplete(interaction, choices).await?;
        Ok(())
    }

    /// A submitted query is either a choice picked from autocomplete or
    /// free text, in which case the first result is used.
    fn resolve_query(&self, query: &str) -> Result<PreviewState, ControllerError> {
        if let Ok(choice) = serde_json::from_str::<SearchChoice>(query) {
            return Ok(PreviewState::new(choice.id, choice.terms));
        }
        let (terms, offset) = strip_offset(parse(query)?);
        if terms.is_empty() {
            return Err(ControllerError::NoResults(query.to_owned()));
        }
        let result = self
            .index
            .search(&terms, 1, offset.unwrap_or(0) as usize)?
            .into_iter()
            .next()
            .ok_or_else(|| ControllerError::NoResults(query.to_owned()))?;
        Ok(PreviewState::new(result.id, Terms(terms)))
    }

    async fn search(&self, interaction: Interaction, query: &str) -> Result<Spawned, ControllerError> {
        let state = self.resolve_query(query)?;
        self.gateway
            .reply(&interaction, placeholder("rendering", &state))
            .await?;
        Ok(Some(self.spawn_preview(interaction, state)))
    }

    async fn help(&self, interaction: &Interaction, topic: &str) -> Result<(), ControllerError> {
        let text = if topic.trim().eq_ignore_ascii_case(PUBLICATIONS_TOPIC) {
            help::render_publications(&self.db.list_publications().await?)
        } else {
            help::topic_text(topic).ok_or_else(|| {
                ControllerError::UnknownTopic(topic.to_owned(), help::topics().join(", "))
            })?
        };
        self.gateway
            .reply(interaction, Reply::ephemeral(text))
            .await?;
        Ok(())
    }

    /// Only clips this bot posted for the caller.
    async fn delete(&self, interaction: &Interaction, target: &MessageRef) -> Result<(), ControllerError> {
        let ours = self.bot_user_id.as_deref() == Some(target.author_id.as_str());
        let posted_by = format!("posted by {}", interaction.user.mention());
        if !ours || !target.content.lines().any(|l| l.trim() == posted_by) {
            return Err(ControllerError::NotDeletable);
        }
        self.gateway.delete_message(target).await?;
        log::info!("deleted {} for {}", target.id, interaction.user.id);
        self.gateway
            .reply(interaction, Reply::ephemeral("Deleted."))
            .await?;
        Ok(())
    }

    fn attached_state(interaction: &Interaction) -> Result<PreviewState, ControllerError> {
        let message = interaction
            .message
            .as_ref()
            .ok_or(ControllerError::NoMessage)?;
        Ok(PreviewState::decode(&message.content)?)
    }

    async fn button(&self, interaction: Interaction, custom_id: &str) -> Result<Spawned, ControllerError> {
        let state = Self::attached_state(&interaction)?;
        let (action, id) = match custom_id.parse()? {
            Command::Update(update) => {
                let state = self.apply(state, vec![update]).await?;
                return self.refresh(interaction, state).await;
            }
            Command::Act(action, id) => (action, id),
        };
        if id != state.id {
            log::debug!("{} pressed for {} on a preview of {}", action, id, state.id);
        }
        match action {
            Action::NextResult => {
                let state = self.step_result(state, 1)?;
                self.refresh(interaction, state).await
            }
            Action::PrevResult => {
                let state = self.step_result(state, -1)?;
                self.refresh(interaction, state).await
            }
            Action::Post => self.post(interaction, state).await,
            Action::EditSubs => {
                let source = self.clip_source(&state.id).await?;
                let modal = buttons::subs_modal(&state, &originals(&source.dialog));
                self.gateway.open_modal(&interaction, modal).await?;
                Ok(None)
            }
            Action::EditCaption => {
                self.gateway
                    .open_modal(&interaction, buttons::caption_modal(&state))
                    .await?;
                Ok(None)
            }
            Action::EditTiming => {
                self.gateway
                    .open_modal(&interaction, buttons::timing_modal(&state))
                    .await?;
                Ok(None)
            }
            Action::UpdateState => {
                Err(ComponentError::UnknownAction(action.to_string()).into())
            }
        }
    }

    async fn modal(
        &self,
        interaction: Interaction,
        custom_id: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Spawned, ControllerError> {
        let state = Self::attached_state(&interaction)?;
        let action = match custom_id.parse()? {
            Command::Act(action, _) => action,
            Command::Update(_) => {
                return Err(ComponentError::UnknownAction(Action::UpdateState.to_string()).into())
            }
        };
        let updates = buttons::modal_updates(action, fields)?;
        let state = self.apply(state, updates).await?;
        self.refresh(interaction, state).await
    }

    async fn apply(
        &self,
        mut state: PreviewState,
        updates: Vec<StateUpdate>,
    ) -> Result<PreviewState, ControllerError> {
        for update in updates {
            let dialog = self.db.get_dialog(&state.id).await?;
            let limits = UpdateLimits {
                max_clip: self.renderer.max_clip(),
                span: dialog_span(&dialog),
            };
            log::trace!("applying {:?} to {}", update, state.id);
            state = state.apply(update, limits);
        }
        Ok(state)
    }

    /// Re-run the original query and move to the neighbouring result.
    fn step_result(&self, state: PreviewState, step: isize) -> Result<PreviewState, ControllerError> {
        if state.original_terms.is_empty() {
            return Err(ControllerError::NoMoreResults);
        }
        let results = self
            .index
            .search(state.original_terms.as_slice(), NAVIGATION_PAGE_SIZE, 0)?;
        let current = state.original_position.unwrap_or(state.id.range);
        let idx = results
            .iter()
            .position(|r| r.id.episode == state.id.episode && r.id.range == current)
            .ok_or(ControllerError::LostResult)?;
        let next = idx
            .checked_add_signed(step)
            .and_then(|i| results.get(i))
            .ok_or(ControllerError::NoMoreResults)?;
        let limits = UpdateLimits {
            max_clip: self.renderer.max_clip(),
            span: Duration::ZERO,
        };
        Ok(state.apply(StateUpdate::ResetMediaId(next.id.clone()), limits))
    }

    async fn refresh(&self, interaction: Interaction, state: PreviewState) -> Result<Spawned, ControllerError> {
        self.gateway
            .update(&interaction, placeholder("rendering", &state))
            .await?;
        Ok(Some(self.spawn_preview(interaction, state)))
    }

    async fn post(&self, interaction: Interaction, state: PreviewState) -> Result<Spawned, ControllerError> {
        self.gateway
            .update(&interaction, placeholder("posting", &state))
            .await?;
        let controller = self.clone();
        Ok(Some(tokio::spawn(async move {
            if let Err(e) = controller.finish_post(&interaction, &state).await {
                controller.report_edit(&interaction, &state, e).await;
            }
        })))
    }

    async fn finish_post(&self, interaction: &Interaction, state: &PreviewState) -> Result<(), ControllerError> {
        let (clip, _) = self.render_state(interaction, state).await?;
        let posted = self
            .gateway
            .followup(
                interaction,
                Reply {
                    content: format!("posted by {}", interaction.user.mention()),
                    ephemeral: false,
                    attachment: Some(attachment(clip)),
                    components: Vec::new(),
                },
            )
            .await?;
        log::info!("{} posted {} as {}", interaction.user.id, state.id, posted.id);
        self.gateway
            .edit_reply(interaction, Reply::ephemeral(format!("Posted `{}`.", state.id)))
            .await?;
        Ok(())
    }

    fn spawn_preview(&self, interaction: Interaction, state: PreviewState) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.finish_preview(&interaction, &state).await {
                controller.report_edit(&interaction, &state, e).await;
            }
        })
    }

    async fn finish_preview(&self, interaction: &Interaction, state: &PreviewState) -> Result<(), ControllerError> {
        let (clip, dialog) = self.render_state(interaction, state).await?;
        let lines = self.line_context(&state.id).await?;
        let reply = Reply {
            content: preview_content(state, &dialog),
            ephemeral: true,
            attachment: Some(attachment(clip)),
            components: preview_rows(state, lines),
        };
        self.gateway.edit_reply(interaction, reply).await?;
        Ok(())
    }

    /// Swap the placeholder for the failure, keeping the state and buttons
    /// so the user can carry on from there.
    async fn report_edit(&self, interaction: &Interaction, state: &PreviewState, err: ControllerError) {
        log_failure(interaction, &err);
        if err.kind() == ErrorKind::Duplicate {
            return;
        }
        let lines = self.line_context(&state.id).await.unwrap_or_default();
        let reply = Reply {
            content: format!("Failed: {}\n{}", err.user_message(), state.encode()),
            ephemeral: true,
            attachment: None,
            components: preview_rows(state, lines),
        };
        if let Err(e) = self.gateway.edit_reply(interaction, reply).await {
            log::error!("unable to edit failed preview {}: {}", interaction.id, e);
        }
    }

    async fn clip_source(&self, id: &MediaId) -> Result<ClipSource, ControllerError> {
        let dialog = self.db.get_dialog(id).await?;
        if dialog.is_empty() {
            return Err(ControllerError::NoDialog(id.clone()));
        }
        let video_file = self
            .db
            .episode_video(&id.episode)
            .await?
            .ok_or_else(|| ControllerError::NoDialog(id.clone()))?;
        Ok(ClipSource { dialog, video_file })
    }

    async fn render_state(
        &self,
        interaction: &Interaction,
        state: &PreviewState,
    ) -> Result<(RenderedClip, Vec<Dialog>), ControllerError> {
        let source = self.clip_source(&state.id).await?;
        let clip = self
            .renderer
            .render(&RenderRequest {
                user_id: &interaction.user.id,
                media_id: &state.id,
                video_file: &source.video_file,
                dialog: &source.dialog,
                settings: &state.settings,
                overlays: &[],
                disable_cache: false,
            })
            .await?;
        Ok((clip, source.dialog))
    }

    async fn line_context(&self, id: &MediaId) -> Result<LineContext, ControllerError> {
        let (before, after) = self
            .db
            .get_dialog_context(&id.episode, id.start(), id.end(), 1, 1)
            .await?;
        Ok(LineContext {
            has_before: !before.is_empty(),
            has_after: !after.is_empty(),
        })
    }
}

fn log_failure(interaction: &Interaction, err: &ControllerError) {
    match err.kind() {
        ErrorKind::Duplicate => log::debug!("duplicate interaction {}: {}", interaction.id, err),
        ErrorKind::UserInput | ErrorKind::InProgress => {
            log::info!("interaction {} rejected: {}", interaction.id, err)
        }
        ErrorKind::Backend => log::error!("interaction {} failed: {}", interaction.id, err),
    }
}

#[cfg(test)]
mod test {
    use std::time::SystemTime;

    use quoteclip_core::{
        identifiers::EpisodeId, test_util::generate_dialog, Episode,
    };
    use search::episode_documents;

    use super::{gateway::test_util::{RecordingGateway, Sent}, *};
    use crate::{
        ffmpeg::test_util::FakeTranscoder,
        media_cache::MediaCache,
        render::{Mode, RenderPaths},
    };

    const USER: &str = "42";
    const BOT: &str = "1000";

    struct Fixture {
        _dir: tempfile::TempDir,
        controller: Controller,
        gateway: RecordingGateway,
        transcoder: FakeTranscoder,
        renderer: Arc<Renderer>,
    }

    async fn fixture_with(transcoder: FakeTranscoder) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("xfm-S01E02.webm"), b"video").unwrap();

        let db = Database::memory().await.unwrap();
        let index = SearchIndex::memory().unwrap();
        let episode = Episode {
            id: EpisodeId::new("xfm", 1, 2).unwrap(),
            srt_file: "xfm-S01E02.srt".to_owned(),
            video_file: "xfm-S01E02.webm".to_owned(),
            dialog: generate_dialog(&[
                "I love monkey news",
                "who is that",
                "little monkey",
                "nothing to see",
                "monkey business",
            ]),
        };
        db.ingest_episode(&episode, "xfm-S01E02.srt", SystemTime::now())
            .await
            .unwrap();
        index.upsert(&episode_documents(&episode), false).unwrap();
        index.refresh_snapshot().unwrap();

        let renderer = Arc::new(Renderer::new(
            Arc::new(transcoder.clone()),
            MediaCache::new(dir.path().join("cache")).unwrap(),
            RenderPaths {
                media,
                fonts: dir.path().join("fonts"),
                overlays: dir.path().join("overlays"),
            },
            Duration::from_secs(20),
            Duration::from_secs(30),
        ));
        let gateway = RecordingGateway::default();
        let controller = Controller::new(
            db,
            index,
            renderer.clone(),
            Arc::new(gateway.clone()),
            Some(BOT.to_owned()),
        );
        Fixture {
            _dir: dir,
            controller,
            gateway,
            transcoder,
            renderer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(FakeTranscoder::default()).await
    }

    fn interaction(id: &str, message: Option<MessageRef>) -> Interaction {
        Interaction {
            id: id.to_owned(),
            user: User {
                id: USER.to_owned(),
                name: "karl".to_owned(),
            },
            channel_id: "chan".to_owned(),
            message,
        }
    }

    fn preview_message(content: &str) -> MessageRef {
        MessageRef {
            id: "preview".to_owned(),
            channel_id: "chan".to_owned(),
            author_id: BOT.to_owned(),
            content: content.to_owned(),
        }
    }

    fn monkey_state(pos: u32) -> PreviewState {
        let id = MediaId::single(EpisodeId::new("xfm", 1, 2).unwrap(), pos);
        PreviewState::new(id, "monkey".parse().unwrap())
    }

    async fn press(f: &Fixture, state: &PreviewState, custom_id: String) {
        let ev = Event::Button {
            interaction: interaction("press", Some(preview_message(&state.encode()))),
            custom_id,
        };
        if let Some(h) = f.controller.handle(ev).await {
            h.await.unwrap();
        }
    }

    fn edited_state(f: &Fixture) -> PreviewState {
        match f.gateway.last() {
            Sent::EditReply(r) => PreviewState::decode(&r.content).unwrap(),
            other => panic!("expected an edit, got {:?}", other),
        }
    }

    fn button_id(state: &PreviewState, label: &str) -> String {
        preview_rows(state, LineContext { has_before: true, has_after: true })
            .into_iter()
            .flatten()
            .find(|b| b.label == label)
            .unwrap()
            .custom_id
    }

    #[tokio::test]
    async fn autocomplete_lists_choices() {
        let f = fixture().await;
        let ev = Event::Autocomplete {
            interaction: interaction("auto", None),
            query: "monkey".to_owned(),
        };
        assert!(f.controller.handle(ev).await.is_none());
        let choices = match f.gateway.last() {
            Sent::Autocomplete(c) => c,
            other => panic!("{:?}", other),
        };
        assert_eq!(choices.len(), 3);
        assert!(choices.iter().all(|c| c.name.starts_with("[S01E02] ")));
        let picked: SearchChoice = serde_json::from_str(&choices[0].value).unwrap();
        assert_eq!(picked.terms.to_string(), "monkey");
        assert_eq!(picked.id.episode, EpisodeId::new("xfm", 1, 2).unwrap());
    }

    #[tokio::test]
    async fn autocomplete_bad_query_has_no_choices() {
        let f = fixture().await;
        let ev = Event::Autocomplete {
            interaction: interaction("auto", None),
            query: "\"unterminated".to_owned(),
        };
        f.controller.handle(ev).await;
        assert_eq!(f.gateway.sent(), vec![Sent::Autocomplete(Vec::new())]);
    }

    #[test]
    fn long_choice_values_drop_terms() {
        let id: MediaId = "xfm-S01E02-3".parse().unwrap();
        let terms: Terms = "monkey".parse().unwrap();
        let short = SearchChoice {
            terms: terms.clone(),
            id: id.clone(),
        };
        assert_eq!(
            serde_json::from_str::<SearchChoice>(&short.encode()).unwrap(),
            short
        );
        let long = SearchChoice {
            terms: "a very long query about monkeys and news and who is that in the studio today"
                .parse()
                .unwrap(),
            id: id.clone(),
        };
        let value = long.encode();
        assert!(value.chars().count() <= MAX_CHOICE_LEN);
        let back: SearchChoice = serde_json::from_str(&value).unwrap();
        assert!(back.terms.is_empty());
        assert_eq!(back.id, id);
    }

    #[tokio::test]
    async fn search_replies_then_edits_in_preview() {
        let f = fixture().await;
        let value = SearchChoice {
            terms: "monkey".parse().unwrap(),
            id: "xfm-S01E02-3".parse().unwrap(),
        }
        .encode();
        let ev = Event::Search {
            interaction: interaction("search", None),
            query: value,
        };
        f.controller.handle(ev).await.unwrap().await.unwrap();

        let sent = f.gateway.sent();
        assert_eq!(sent.len(), 2);
        let expected = monkey_state(3);
        match &sent[0] {
            Sent::Reply(r) => {
                assert!(r.ephemeral);
                assert!(r.content.starts_with("rendering `xfm-S01E02-3`"));
                assert_eq!(PreviewState::decode(&r.content).unwrap(), expected);
            }
            other => panic!("{:?}", other),
        }
        match &sent[1] {
            Sent::EditReply(r) => {
                assert_eq!(PreviewState::decode(&r.content).unwrap(), expected);
                assert!(r.content.contains("> little monkey"));
                let file = r.attachment.as_ref().unwrap();
                assert_eq!(file.file_name, "xfm-S01E02-3.gif");
                assert_eq!(file.mime_type, "image/gif");
                assert_eq!(r.components.len(), 5);
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(f.transcoder.call_count(), 1);
    }

    #[tokio::test]
    async fn free_text_search_uses_first_result() {
        let f = fixture().await;
        let ev = Event::Search {
            interaction: interaction("search", None),
            query: "business".to_owned(),
        };
        f.controller.handle(ev).await.unwrap().await.unwrap();
        assert_eq!(edited_state(&f).id.to_string(), "xfm-S01E02-5");
    }

    #[tokio::test]
    async fn search_without_results_is_user_error() {
        let f = fixture().await;
        let ev = Event::Search {
            interaction: interaction("search", None),
            query: "zebra".to_owned(),
        };
        assert!(f.controller.handle(ev).await.is_none());
        assert_eq!(
            f.gateway.sent(),
            vec![Sent::Reply(Reply::ephemeral("no results for \"zebra\""))]
        );
        assert_eq!(f.transcoder.call_count(), 0);
    }

    #[tokio::test]
    async fn state_buttons_update_and_rerender() {
        let f = fixture().await;
        let state = monkey_state(3);
        press(&f, &state, button_id(&state, "mode: normal")).await;

        let sent = f.gateway.sent();
        assert!(matches!(&sent[0], Sent::Update(r) if r.content.starts_with("rendering")));
        let next = edited_state(&f);
        assert_eq!(next.settings.mode, Mode::Caption);
        assert_eq!(next.id, state.id);
        // customised clips bypass the cache but still render
        assert_eq!(f.transcoder.call_count(), 1);
    }

    #[tokio::test]
    async fn extend_is_clamped_to_max_clip() {
        let f = fixture().await;
        let state = monkey_state(3);
        let huge = Command::Update(StateUpdate::SetExtendOrTrim(
            quoteclip_core::duration::SignedDuration::from_secs(60),
        ));
        press(&f, &state, huge.custom_id()).await;
        // one line lasts 2s, so at most 18s more
        assert_eq!(
            edited_state(&f).settings.extend_or_trim,
            quoteclip_core::duration::SignedDuration::from_secs(18)
        );
    }

    #[tokio::test]
    async fn next_and_previous_result() {
        let f = fixture().await;
        let results = f.controller.index.search_text("monkey", 10).unwrap();
        let first = PreviewState::new(results[0].id.clone(), "monkey".parse().unwrap());

        press(&f, &first, button_id(&first, "result ▶")).await;
        let second = edited_state(&f);
        assert_eq!(second.id, results[1].id);
        assert_eq!(second.original_terms, first.original_terms);
        assert_eq!(second.original_position, Some(results[1].id.range));

        press(&f, &second, button_id(&second, "◀ result")).await;
        assert_eq!(edited_state(&f).id, results[0].id);
    }

    #[tokio::test]
    async fn no_result_before_the_first() {
        let f = fixture().await;
        let results = f.controller.index.search_text("monkey", 10).unwrap();
        let first = PreviewState::new(results[0].id.clone(), "monkey".parse().unwrap());
        press(&f, &first, button_id(&first, "◀ result")).await;
        assert_eq!(
            f.gateway.sent(),
            vec![Sent::Reply(Reply::ephemeral("no more results"))]
        );
    }

    #[tokio::test]
    async fn post_publishes_and_closes_preview() {
        let f = fixture().await;
        let state = monkey_state(3);
        press(&f, &state, button_id(&state, "Post")).await;
        let sent = f.gateway.sent();
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0], Sent::Update(r) if r.content.starts_with("posting")));
        match &sent[1] {
            Sent::Followup(r) => {
                assert!(!r.ephemeral);
                assert_eq!(r.content, "posted by <@42>");
                assert!(r.attachment.is_some());
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(
            sent[2],
            Sent::EditReply(Reply::ephemeral("Posted `xfm-S01E02-3`."))
        );
    }

    #[tokio::test]
    async fn repeated_post_renders_once() {
        let f = fixture_with(FakeTranscoder::slow(Duration::from_millis(500))).await;
        let state = monkey_state(3);
        let ev = || Event::Button {
            interaction: interaction("press", Some(preview_message(&state.encode()))),
            custom_id: button_id(&state, "Post"),
        };
        let first = f.controller.handle(ev()).await.unwrap();
        let second = f.controller.handle(ev()).await.unwrap();
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(f.transcoder.call_count(), 1);
        let followups = f
            .gateway
            .sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Followup(_)))
            .count();
        assert_eq!(followups, 1);
    }

    #[tokio::test]
    async fn render_in_progress_is_reported() {
        let f = fixture().await;
        let other: MediaId = "xfm-S01E02-1".parse().unwrap();
        let _held = f.renderer.locks().acquire(USER, &other).unwrap();
        let state = monkey_state(3);
        press(&f, &state, button_id(&state, "Post")).await;
        match f.gateway.last() {
            Sent::EditReply(r) => {
                assert!(r.content.starts_with("Failed: you already have a render in progress"));
                assert_eq!(PreviewState::decode(&r.content).unwrap(), state);
                assert_eq!(r.components.len(), 5);
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(f.transcoder.call_count(), 0);
    }

    #[tokio::test]
    async fn transcoder_failure_is_shown() {
        let f = fixture_with(FakeTranscoder::failing()).await;
        let state = monkey_state(3);
        press(&f, &state, button_id(&state, "subs: on")).await;
        match f.gateway.last() {
            Sent::EditReply(r) => {
                assert!(r.content.contains("Invalid data found when processing input"));
                assert!(r.attachment.is_none());
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn modal_buttons_open_modals() {
        let f = fixture().await;
        let state = monkey_state(3);
        press(&f, &state, button_id(&state, "edit subs…")).await;
        match f.gateway.last() {
            Sent::Modal(m) => {
                assert_eq!(m.custom_id, "edit_subs:xfm-S01E02-3");
                assert_eq!(m.fields[0].value, "little monkey");
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn timing_modal_submission() {
        let f = fixture().await;
        let state = monkey_state(3);
        let ev = Event::Modal {
            interaction: interaction("modal", Some(preview_message(&state.encode()))),
            custom_id: "edit_timing:xfm-S01E02-3".to_owned(),
            fields: HashMap::from([
                ("shift".to_owned(), "-0.5s".to_owned()),
                ("extend".to_owned(), "2s".to_owned()),
            ]),
        };
        f.controller.handle(ev).await.unwrap().await.unwrap();
        let next = edited_state(&f);
        assert_eq!(next.settings.shift.as_millis(), -500);
        assert_eq!(next.settings.extend_or_trim.as_millis(), 2000);
    }

    #[tokio::test]
    async fn buttons_need_a_preview() {
        let f = fixture().await;
        let ev = Event::Button {
            interaction: interaction("press", Some(preview_message("just a message"))),
            custom_id: "post:xfm-S01E02-3".to_owned(),
        };
        assert!(f.controller.handle(ev).await.is_none());
        assert_eq!(
            f.gateway.sent(),
            vec![Sent::Reply(Reply::ephemeral(
                "message does not contain a preview state"
            ))]
        );
    }

    #[tokio::test]
    async fn delete_own_post() {
        let f = fixture().await;
        let target = MessageRef {
            id: "posted".to_owned(),
            channel_id: "chan".to_owned(),
            author_id: BOT.to_owned(),
            content: "posted by <@42>".to_owned(),
        };
        let ev = Event::Delete {
            interaction: interaction("delete", None),
            target,
        };
        f.controller.handle(ev).await;
        assert_eq!(
            f.gateway.sent(),
            vec![
                Sent::Delete("posted".to_owned()),
                Sent::Reply(Reply::ephemeral("Deleted."))
            ]
        );
    }

    #[tokio::test]
    async fn delete_refuses_other_posts() {
        let f = fixture().await;
        for (author, content) in [(BOT, "posted by <@7>"), ("999", "posted by <@42>")] {
            let ev = Event::Delete {
                interaction: interaction("delete", None),
                target: MessageRef {
                    id: "posted".to_owned(),
                    channel_id: "chan".to_owned(),
                    author_id: author.to_owned(),
                    content: content.to_owned(),
                },
            };
            f.controller.handle(ev).await;
        }
        let refusal = Sent::Reply(Reply::ephemeral("only clips you posted can be deleted"));
        assert_eq!(f.gateway.sent(), vec![refusal.clone(), refusal]);
    }

    #[tokio::test]
    async fn help_topics() {
        let f = fixture().await;
        for topic in ["search", "publications", "nope"] {
            let ev = Event::Help {
                interaction: interaction("help", None),
                topic: topic.to_owned(),
            };
            f.controller.handle(ev).await;
        }
        let texts = f
            .gateway
            .sent()
            .into_iter()
            .map(|s| match s {
                Sent::Reply(r) => r.content,
                other => panic!("{:?}", other),
            })
            .collect::<Vec<_>>();
        assert!(texts[0].contains("/search"));
        assert!(texts[1].contains("`~xfm` series 1"));
        assert!(texts[2].starts_with("unknown help topic \"nope\""));
    }

    #[test]
    fn error_kinds() {
        let id: MediaId = "xfm-S01E02-3".parse().unwrap();
        let dup = ControllerError::from(RenderError::from(LockError::Duplicate(id.clone())));
        assert_eq!(dup.kind(), ErrorKind::Duplicate);
        assert_eq!(dup.user_message(), "");

        let busy = ControllerError::from(RenderError::from(LockError::InProgress(id)));
        assert_eq!(busy.kind(), ErrorKind::InProgress);
        assert_eq!(busy.user_message(), "you already have a render in progress");

        let timeout = ControllerError::from(RenderError::from(TranscodeError::Timeout(
            Duration::from_secs(30),
        )));
        assert_eq!(timeout.kind(), ErrorKind::Backend);
        assert_eq!(timeout.user_message(), GENERIC_FAILURE);

        let query = ControllerError::from(SearchError::from(QueryError::UnterminatedQuote));
        assert_eq!(query.kind(), ErrorKind::UserInput);
    }
}
