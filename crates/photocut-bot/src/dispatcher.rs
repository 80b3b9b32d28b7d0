//! Command dispatch.
//!
//! The [`Dispatcher`] owns the process-wide state: the authorization
//! session and the retained source video. Each incoming text is parsed,
//! executed and answered; a failing command is logged and answered with a
//! single failure message, never propagated further.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use photocut_core::{
    Command, CommandError, CommandKind, ExcerptRange, HELP_TEXT, MESSAGE_LIMIT,
    format_video_list, paginate, parse_command,
};
use photocut_providers::{
    CredentialStore, PhotoLibrary, ProviderErrorCode, Session,
};

use crate::error::{BotError, BotResult};
use crate::excerpt::Excerpter;
use crate::session::AuthSession;
use crate::transport::{ChatId, ChatTransport};
use crate::workspace::{SourceCache, remove_if_exists};

const NO_VIDEOS: &str = "No videos found.";

/// Routes chat commands to the credential store, photo library and transcoder.
pub struct Dispatcher {
    credentials: Arc<dyn CredentialStore>,
    library: Arc<dyn PhotoLibrary>,
    excerpter: Arc<dyn Excerpter>,
    transport: Arc<dyn ChatTransport>,
    session: Mutex<AuthSession>,
    /// Held for the whole download, cut and send sequence of `/cut`.
    cache: Mutex<SourceCache>,
}

impl Dispatcher {
    /// Creates a dispatcher starting in the unauthenticated state.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        library: Arc<dyn PhotoLibrary>,
        excerpter: Arc<dyn Excerpter>,
        transport: Arc<dyn ChatTransport>,
        cache: SourceCache,
    ) -> Self {
        Self {
            credentials,
            library,
            excerpter,
            transport,
            session: Mutex::new(AuthSession::default()),
            cache: Mutex::new(cache),
        }
    }

    /// Returns a snapshot of the authorization session.
    pub async fn auth_state(&self) -> AuthSession {
        self.session.lock().await.clone()
    }

    /// Handles one incoming chat text.
    ///
    /// Text that is not a slash command is ignored.
    pub async fn handle_text(&self, chat: ChatId, text: &str) {
        let Some(parsed) = parse_command(text) else {
            debug!(chat_id = %chat, "ignoring non-command text");
            return;
        };

        let command = match parsed {
            Ok(command) => command,
            Err(CommandError::Usage(kind)) => {
                debug!(chat_id = %chat, command = %kind, "malformed command");
                self.reply(chat, kind.usage()).await;
                return;
            }
            Err(CommandError::Unknown(keyword)) => {
                debug!(chat_id = %chat, keyword = %keyword, "unknown command");
                self.reply(chat, HELP_TEXT).await;
                return;
            }
            Err(CommandError::InvalidRange(e)) => {
                info!(chat_id = %chat, error = %e, "rejected cut request");
                self.reply(chat, &format!("Invalid time range: {}.", e))
                    .await;
                return;
            }
        };

        let kind = command.kind();
        info!(chat_id = %chat, command = %kind, "handling command");

        if let Err(e) = self.execute(chat, command).await {
            self.report_failure(chat, kind, e).await;
        }
    }

    async fn execute(&self, chat: ChatId, command: Command) -> BotResult<()> {
        match command {
            Command::Start => self.start(chat).await,
            Command::Auth { code } => self.complete_authorization(chat, &code).await,
            Command::Clear => self.clear(chat).await,
            Command::List { count } => self.list(chat, count).await,
            Command::Cut { item_id, range } => self.cut(chat, &item_id, range).await,
            Command::Help => self.send(chat, HELP_TEXT).await,
        }
    }

    async fn start(&self, chat: ChatId) -> BotResult<()> {
        match self.credentials.load().await {
            Ok(_) => {
                self.session.lock().await.authenticate();
                self.send(chat, "You are already authenticated.").await
            }
            Err(e) if e.is_unauthenticated() => {
                debug!(reason = %e, "no usable credential");
                self.request_authorization(chat, None).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_authorization(&self, chat: ChatId, code: &str) -> BotResult<()> {
        // Held across the exchange so two codes cannot race for one verifier.
        let mut session = self.session.lock().await;
        let Some(pending) = session.pending().cloned() else {
            return Err(BotError::out_of_order(
                CommandKind::Auth,
                format!("session is {}", session.name()),
            ));
        };

        self.credentials
            .complete_authorization(&pending, code)
            .await?;
        session.authenticate();
        drop(session);

        info!(chat_id = %chat, "authorization completed");
        self.send(
            chat,
            "Authentication successful! You can now use /list and /cut.",
        )
        .await
    }

    async fn clear(&self, chat: ChatId) -> BotResult<()> {
        self.credentials.clear().await?;
        self.session.lock().await.reset();
        info!(chat_id = %chat, "credential cleared");
        self.send(chat, "Stored credential cleared. Send /start to authorize again.")
            .await
    }

    async fn list(&self, chat: ChatId, count: usize) -> BotResult<()> {
        let Some(session) = self.require_session(chat, CommandKind::List).await? else {
            return Ok(());
        };

        let items = self.library.list_recent_videos(&session, count).await?;
        info!(chat_id = %chat, requested = count, count = items.len(), "listed videos");

        if items.is_empty() {
            return self.send(chat, NO_VIDEOS).await;
        }

        let entries = format_video_list(&items);
        for message in paginate(&entries, MESSAGE_LIMIT) {
            self.send(chat, &message).await?;
        }
        Ok(())
    }

    async fn cut(&self, chat: ChatId, item_id: &str, range: ExcerptRange) -> BotResult<()> {
        let Some(session) = self.require_session(chat, CommandKind::Cut).await? else {
            return Ok(());
        };

        let mut cache = self.cache.lock().await;
        let source = cache.retain(item_id).await?;

        if tokio::fs::try_exists(&source).await? {
            debug!(item_id = %item_id, "source video already downloaded");
        } else {
            let bytes = self
                .library
                .fetch_and_store(&session, item_id, &source)
                .await?;
            info!(item_id = %item_id, bytes, "downloaded source video");
        }

        let excerpt = cache.excerpt_path(item_id);
        self.excerpter.cut(&source, &excerpt, range).await?;
        info!(item_id = %item_id, %range, "excerpt created");

        let caption = format!(
            "Here's your cut video from {} to {}.",
            range.start(),
            range.end()
        );
        let sent = self.transport.send_video(chat, &excerpt, &caption).await;

        if let Err(e) = remove_if_exists(&excerpt).await {
            warn!(item_id = %item_id, error = %e, "failed to delete excerpt");
        }
        sent?;
        Ok(())
    }

    /// Loads the credential, or starts authorization and returns `None`.
    async fn require_session(
        &self,
        chat: ChatId,
        command: CommandKind,
    ) -> BotResult<Option<Session>> {
        match self.credentials.load().await {
            Ok(session) => {
                self.session.lock().await.authenticate();
                Ok(Some(session))
            }
            Err(e) if e.is_unauthenticated() => {
                debug!(command = %command, reason = %e, "no usable credential");
                self.request_authorization(chat, Some(command)).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sends the consent link, starting a new authorization unless one is pending.
    async fn request_authorization(
        &self,
        chat: ChatId,
        retry: Option<CommandKind>,
    ) -> BotResult<()> {
        let url = {
            let mut session = self.session.lock().await;
            match session.pending() {
                Some(pending) => pending.url.clone(),
                None => {
                    let pending = self.credentials.begin_authorization();
                    let url = pending.url.clone();
                    session.await_code(pending);
                    info!(chat_id = %chat, "authorization started");
                    url
                }
            }
        };

        self.send(chat, &authorization_message(&url, retry)).await
    }

    async fn report_failure(&self, chat: ChatId, command: CommandKind, err: BotError) {
        match err {
            BotError::OutOfOrder { ref reason, .. } => {
                info!(chat_id = %chat, command = %command, reason = %reason, "out-of-order command");
                self.reply(
                    chat,
                    "No authorization is pending. Send /start to get an authorization link.",
                )
                .await;
            }
            BotError::Provider(ref e) if e.code() == ProviderErrorCode::InvalidCode => {
                warn!(chat_id = %chat, error = %e, "authorization code rejected");
                self.reply(
                    chat,
                    "The authorization code was rejected. Check it and send /auth <code> again.",
                )
                .await;
            }
            BotError::Provider(ref e) if e.is_unauthenticated() => {
                warn!(chat_id = %chat, command = %command, error = %e, "credential no longer accepted");
                if let Err(e) = self.request_authorization(chat, Some(command)).await {
                    error!(chat_id = %chat, error = %e, "failed to send authorization link");
                }
            }
            err => {
                error!(chat_id = %chat, command = %command, error = %err, "command failed");
                self.reply(chat, failure_message(command)).await;
            }
        }
    }

    async fn send(&self, chat: ChatId, text: &str) -> BotResult<()> {
        self.transport.send_message(chat, text).await?;
        Ok(())
    }

    /// Sends a reply whose failure can only be logged.
    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send_message(chat, text).await {
            error!(chat_id = %chat, error = %e, "failed to send reply");
        }
    }
}

fn authorization_message(url: &str, retry: Option<CommandKind>) -> String {
    let mut message = format!(
        "Authorize this app by visiting this URL:\n{}\n\nThen send /auth <code> with the code from that page.",
        url
    );
    if let Some(command) = retry {
        message.push_str(&format!(" Once authorized, send {} again.", command));
    }
    message
}

fn failure_message(command: CommandKind) -> &'static str {
    match command {
        CommandKind::List => "Failed to retrieve videos.",
        CommandKind::Cut => "Failed to process the video.",
        CommandKind::Start | CommandKind::Auth => "Authorization failed. Please try again.",
        CommandKind::Clear => "Failed to clear the stored credential.",
        CommandKind::Help => "Something went wrong.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use photocut_core::{ENTRY_SEPARATOR, VideoItem};
    use photocut_providers::{
        BoxFuture, PendingAuthorization, ProviderError, ProviderResult,
    };

    use crate::excerpt::ExcerptError;
    use crate::transport::TransportResult;

    const CHAT: ChatId = ChatId(42);

    #[derive(Default)]
    struct FakeCredentials {
        stored: AtomicBool,
        loads: AtomicUsize,
        begins: AtomicUsize,
        exchanges: AtomicUsize,
        cleared: AtomicUsize,
    }

    impl FakeCredentials {
        fn authenticated() -> Self {
            let fake = Self::default();
            fake.stored.store(true, Ordering::SeqCst);
            fake
        }
    }

    impl CredentialStore for FakeCredentials {
        fn load(&self) -> BoxFuture<'_, ProviderResult<Session>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let stored = self.stored.load(Ordering::SeqCst);
            Box::pin(async move {
                if stored {
                    Ok(Session::new("access-token"))
                } else {
                    Err(ProviderError::unauthenticated("no stored credential"))
                }
            })
        }

        fn begin_authorization(&self) -> PendingAuthorization {
            let n = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
            PendingAuthorization {
                url: format!("https://accounts.example.com/auth?attempt={}", n),
                verifier: format!("verifier-{}", n),
                state: format!("state-{}", n),
            }
        }

        fn complete_authorization<'a>(
            &'a self,
            _pending: &'a PendingAuthorization,
            code: &'a str,
        ) -> BoxFuture<'a, ProviderResult<Session>> {
            Box::pin(async move {
                self.exchanges.fetch_add(1, Ordering::SeqCst);
                if code == "good-code" {
                    self.stored.store(true, Ordering::SeqCst);
                    Ok(Session::new("access-token"))
                } else {
                    Err(ProviderError::invalid_code("invalid_grant"))
                }
            })
        }

        fn clear(&self) -> BoxFuture<'_, ProviderResult<()>> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            self.stored.store(false, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct FakeLibrary {
        items: Vec<VideoItem>,
        revoked: bool,
        lists: AtomicUsize,
        downloads: AtomicUsize,
    }

    impl PhotoLibrary for FakeLibrary {
        fn list_recent_videos<'a>(
            &'a self,
            _session: &'a Session,
            count: usize,
        ) -> BoxFuture<'a, ProviderResult<Vec<VideoItem>>> {
            Box::pin(async move {
                self.lists.fetch_add(1, Ordering::SeqCst);
                if self.revoked {
                    return Err(ProviderError::unauthenticated("401 Unauthorized"));
                }
                Ok(self.items.iter().take(count).cloned().collect())
            })
        }

        fn fetch_and_store<'a>(
            &'a self,
            _session: &'a Session,
            item_id: &'a str,
            destination: &'a Path,
        ) -> BoxFuture<'a, ProviderResult<u64>> {
            Box::pin(async move {
                self.downloads.fetch_add(1, Ordering::SeqCst);
                let data = format!("video {}", item_id);
                tokio::fs::write(destination, &data)
                    .await
                    .map_err(|e| ProviderError::storage(e.to_string()))?;
                Ok(data.len() as u64)
            })
        }
    }

    #[derive(Default)]
    struct FakeExcerpter {
        fail: bool,
        cuts: AtomicUsize,
    }

    impl Excerpter for FakeExcerpter {
        fn cut<'a>(
            &'a self,
            input: &'a Path,
            output: &'a Path,
            _range: ExcerptRange,
        ) -> BoxFuture<'a, Result<(), ExcerptError>> {
            Box::pin(async move {
                self.cuts.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(ExcerptError::Spawn {
                        program: "ffmpeg".to_string(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    });
                }
                assert!(input.exists(), "source must exist before cutting");
                std::fs::write(output, b"excerpt").unwrap();
                Ok(())
            })
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text(String),
        Video { path: PathBuf, existed: bool, caption: String },
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: StdMutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        fn texts(&self) -> Vec<String> {
            self.take()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text(text) => Some(text),
                    Sent::Video { .. } => None,
                })
                .collect()
        }
    }

    impl ChatTransport for RecordingTransport {
        fn send_message<'a>(&'a self, chat: ChatId, text: &'a str) -> BoxFuture<'a, TransportResult<()>> {
            assert_eq!(chat, CHAT);
            self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
            Box::pin(async { Ok(()) })
        }

        fn send_video<'a>(
            &'a self,
            chat: ChatId,
            path: &'a Path,
            caption: &'a str,
        ) -> BoxFuture<'a, TransportResult<()>> {
            assert_eq!(chat, CHAT);
            self.sent.lock().unwrap().push(Sent::Video {
                path: path.to_path_buf(),
                existed: path.exists(),
                caption: caption.to_string(),
            });
            Box::pin(async { Ok(()) })
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        credentials: Arc<FakeCredentials>,
        library: Arc<FakeLibrary>,
        excerpter: Arc<FakeExcerpter>,
        transport: Arc<RecordingTransport>,
        dir: tempfile::TempDir,
    }

    async fn harness(
        credentials: FakeCredentials,
        library: FakeLibrary,
        excerpter: FakeExcerpter,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache = SourceCache::open(dir.path().join("downloads")).await.unwrap();
        let credentials = Arc::new(credentials);
        let library = Arc::new(library);
        let excerpter = Arc::new(excerpter);
        let transport = Arc::new(RecordingTransport::default());

        let dispatcher = Dispatcher::new(
            credentials.clone(),
            library.clone(),
            excerpter.clone(),
            transport.clone(),
            cache,
        );

        Harness {
            dispatcher,
            credentials,
            library,
            excerpter,
            transport,
            dir,
        }
    }

    fn item(id: &str, filename: &str) -> VideoItem {
        VideoItem::new(
            id,
            filename,
            Utc.with_ymd_and_hms(2024, 10, 27, 15, 59, 5).unwrap(),
            format!("https://photos.google.com/lr/photo/{}", id),
        )
    }

    /// Videos in the download directory, without the bookkeeping marker.
    fn downloads(h: &Harness) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(h.dir.path().join("downloads"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".mp4"))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn list_while_unauthenticated_sends_only_the_link() {
        for count in [0, 1, 5] {
            let h = harness(
                FakeCredentials::default(),
                FakeLibrary {
                    items: vec![item("A", "v1.mp4")],
                    ..FakeLibrary::default()
                },
                FakeExcerpter::default(),
            )
            .await;

            h.dispatcher.handle_text(CHAT, &format!("/list {}", count)).await;

            let texts = h.transport.texts();
            assert_eq!(texts.len(), 1, "count {}", count);
            assert!(texts[0].contains("https://accounts.example.com/auth?attempt=1"));
            assert!(texts[0].ends_with("Once authorized, send /list again."));
            assert_eq!(h.library.lists.load(Ordering::SeqCst), 0);
            assert!(h.dispatcher.auth_state().await.pending().is_some());
        }
    }

    #[tokio::test]
    async fn list_two_items_in_one_message() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary {
                items: vec![item("A", "v1.mp4"), item("B", "v2.mp4")],
                ..FakeLibrary::default()
            },
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/list 2").await;

        let texts = h.transport.texts();
        assert_eq!(texts.len(), 1);
        insta::assert_snapshot!(texts[0], @r"
        1. v1.mp4
        ID: A
        URL: https://photos.google.com/lr/photo/A
        Created: 2024-10-27T15:59:05Z

        2. v2.mp4
        ID: B
        URL: https://photos.google.com/lr/photo/B
        Created: 2024-10-27T15:59:05Z
        ");
        assert!(h.dispatcher.auth_state().await.is_authenticated());
    }

    #[tokio::test]
    async fn list_empty_and_zero() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/list 5").await;
        h.dispatcher.handle_text(CHAT, "/list 0").await;

        assert_eq!(h.transport.texts(), vec![NO_VIDEOS, NO_VIDEOS]);
    }

    #[tokio::test]
    async fn long_list_is_split_between_entries() {
        let items: Vec<VideoItem> = (0..120)
            .map(|i| item(&format!("id{:03}", i), &format!("{}.mp4", "x".repeat(60))))
            .collect();
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary {
                items: items.clone(),
                ..FakeLibrary::default()
            },
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/list 120").await;

        let texts = h.transport.texts();
        assert!(texts.len() > 1);
        for text in &texts {
            assert!(text.chars().count() <= MESSAGE_LIMIT);
        }
        assert_eq!(
            texts.join(ENTRY_SEPARATOR),
            format_video_list(&items).join(ENTRY_SEPARATOR)
        );
    }

    #[tokio::test]
    async fn revoked_credential_restarts_authorization() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary {
                revoked: true,
                ..FakeLibrary::default()
            },
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/list 3").await;

        let texts = h.transport.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Authorize this app"));
        assert!(h.dispatcher.auth_state().await.pending().is_some());
    }

    #[tokio::test]
    async fn invalid_range_touches_nothing() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher
            .handle_text(CHAT, "/cut abc123 00:00:10 00:00:05")
            .await;

        let texts = h.transport.texts();
        assert_eq!(
            texts,
            vec!["Invalid time range: end time 00:00:05 must be greater than start time 00:00:10."]
        );
        assert_eq!(h.credentials.loads.load(Ordering::SeqCst), 0);
        assert_eq!(h.library.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(h.excerpter.cuts.load(Ordering::SeqCst), 0);
        assert!(downloads(&h).is_empty());
    }

    #[tokio::test]
    async fn repeated_cut_downloads_once() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/cut abc 00:00:01 00:00:05").await;
        h.dispatcher.handle_text(CHAT, "/cut abc 00:01:00 00:01:30").await;

        assert_eq!(h.library.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(h.excerpter.cuts.load(Ordering::SeqCst), 2);

        let excerpt = h.dir.path().join("downloads").join("abc_cut.mp4");
        assert_eq!(
            h.transport.take(),
            vec![
                Sent::Video {
                    path: excerpt.clone(),
                    existed: true,
                    caption: "Here's your cut video from 00:00:01 to 00:00:05.".to_string(),
                },
                Sent::Video {
                    path: excerpt,
                    existed: true,
                    caption: "Here's your cut video from 00:01:00 to 00:01:30.".to_string(),
                },
            ]
        );
        assert_eq!(downloads(&h), vec!["abc.mp4"]);
    }

    #[tokio::test]
    async fn cut_of_another_item_replaces_source() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/cut abc 00:00:01 00:00:05").await;
        assert_eq!(downloads(&h), vec!["abc.mp4"]);

        h.dispatcher.handle_text(CHAT, "/cut xyz 00:00:01 00:00:05").await;
        assert_eq!(downloads(&h), vec!["xyz.mp4"]);
        assert_eq!(h.library.downloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cut_failure_sends_generic_message() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary::default(),
            FakeExcerpter {
                fail: true,
                ..FakeExcerpter::default()
            },
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/cut abc 00:00:01 00:00:05").await;

        assert_eq!(h.transport.take(), vec![Sent::Text("Failed to process the video.".to_string())]);
        assert_eq!(downloads(&h), vec!["abc.mp4"]);
    }

    #[tokio::test]
    async fn cut_while_unauthenticated_downloads_nothing() {
        let h = harness(
            FakeCredentials::default(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/cut abc 00:00:01 00:00:05").await;

        let texts = h.transport.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].ends_with("Once authorized, send /cut again."));
        assert_eq!(h.library.downloads.load(Ordering::SeqCst), 0);
        assert!(downloads(&h).is_empty());
    }

    #[tokio::test]
    async fn auth_without_code_prompts_usage() {
        let h = harness(
            FakeCredentials::default(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/start").await;
        h.transport.take();

        h.dispatcher.handle_text(CHAT, "/auth").await;

        assert_eq!(h.transport.texts(), vec![CommandKind::Auth.usage()]);
        assert_eq!(h.credentials.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_without_pending_authorization_is_rejected() {
        let h = harness(
            FakeCredentials::default(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/auth some-code").await;

        assert_eq!(
            h.transport.texts(),
            vec!["No authorization is pending. Send /start to get an authorization link."]
        );
        assert_eq!(h.credentials.exchanges.load(Ordering::SeqCst), 0);
        assert_eq!(h.dispatcher.auth_state().await, AuthSession::Unauthenticated);
    }

    #[tokio::test]
    async fn authorization_flow() {
        let h = harness(
            FakeCredentials::default(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/start").await;
        let texts = h.transport.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("attempt=1"));
        assert!(texts[0].ends_with("with the code from that page."));

        // A second /start re-sends the pending link.
        h.dispatcher.handle_text(CHAT, "/start").await;
        assert!(h.transport.texts()[0].contains("attempt=1"));
        assert_eq!(h.credentials.begins.load(Ordering::SeqCst), 1);

        h.dispatcher.handle_text(CHAT, "/auth wrong-code").await;
        assert_eq!(
            h.transport.texts(),
            vec!["The authorization code was rejected. Check it and send /auth <code> again."]
        );
        assert!(h.dispatcher.auth_state().await.pending().is_some());

        h.dispatcher.handle_text(CHAT, "/auth good-code").await;
        assert_eq!(
            h.transport.texts(),
            vec!["Authentication successful! You can now use /list and /cut."]
        );
        assert!(h.dispatcher.auth_state().await.is_authenticated());
        assert_eq!(h.credentials.exchanges.load(Ordering::SeqCst), 2);

        h.dispatcher.handle_text(CHAT, "/start").await;
        assert_eq!(h.transport.texts(), vec!["You are already authenticated."]);
    }

    #[tokio::test]
    async fn clear_resets_session() {
        let h = harness(
            FakeCredentials::authenticated(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "/start").await;
        assert!(h.dispatcher.auth_state().await.is_authenticated());
        h.transport.take();

        h.dispatcher.handle_text(CHAT, "/clear").await;
        assert_eq!(
            h.transport.texts(),
            vec!["Stored credential cleared. Send /start to authorize again."]
        );
        assert_eq!(h.credentials.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.auth_state().await, AuthSession::Unauthenticated);
    }

    #[tokio::test]
    async fn help_unknown_and_plain_text() {
        let h = harness(
            FakeCredentials::default(),
            FakeLibrary::default(),
            FakeExcerpter::default(),
        )
        .await;

        h.dispatcher.handle_text(CHAT, "hello").await;
        h.dispatcher.handle_text(CHAT, "/help").await;
        h.dispatcher.handle_text(CHAT, "/frobnicate").await;
        h.dispatcher.handle_text(CHAT, "/list five").await;
        h.dispatcher.handle_text(CHAT, "/cut abc 1:00 2:00").await;

        assert_eq!(
            h.transport.texts(),
            vec![
                HELP_TEXT,
                HELP_TEXT,
                CommandKind::List.usage(),
                CommandKind::Cut.usage(),
            ]
        );
        assert_eq!(h.credentials.loads.load(Ordering::SeqCst), 0);
    }
}
