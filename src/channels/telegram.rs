//! Telegram front-end — long-polls the Bot API for updates.
//!
//! Translates updates into orchestrator turns: text and photos become
//! inbound messages, inline-keyboard presses become the reserved action
//! markers, GPS shares and stage/language buttons become deterministic
//! field sets applied before the turn runs. Each turn holds the session's
//! single-writer lock across load → run_turn → save.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::advisor::Advisor;
use crate::advisor::signals::{
    ACTION_BUY, ACTION_CROP_RECO, ACTION_DIGEST, ACTION_MARKET, ACTION_SCHEMES,
    ACTION_SET_LANG_PREFIX,
};
use crate::advisor::lang::tr;
use crate::channels::render;
use crate::error::ChannelError;
use crate::session::{ImageAsset, SessionState, Stage, utc_now_iso};
use crate::store::{SessionLocks, SessionStore};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Caption used when a photo arrives without one.
const DEFAULT_PHOTO_PROMPT: &str = "Analyze this crop photo and suggest safe remedy steps.";

pub struct TelegramBot {
    bot_token: String,
    client: reqwest::Client,
    media_dir: PathBuf,
    store: Arc<dyn SessionStore>,
    advisor: Arc<Advisor>,
    locks: Arc<SessionLocks>,
}

impl TelegramBot {
    pub fn new(
        bot_token: String,
        media_dir: PathBuf,
        store: Arc<dyn SessionStore>,
        advisor: Arc<Advisor>,
    ) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            media_dir,
            store,
            advisor,
            locks: Arc::new(SessionLocks::new()),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        )
    }

    /// Verify the token and report the bot identity.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Main long-poll loop. Runs until the task is cancelled.
    pub async fn run(&self) {
        let mut offset: i64 = 0;
        info!("Telegram bot listening for updates...");

        loop {
            let body = json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            });

            let resp = match self.client.post(self.api_url("getUpdates")).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Telegram poll error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let data: Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    warn!("Telegram parse error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(results) = data.get("result").and_then(Value::as_array) else {
                continue;
            };
            for update in results {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = update_id + 1;
                }
                if let Err(e) = self.handle_update(update).await {
                    error!("Failed to handle Telegram update: {e}");
                }
            }
        }
    }

    async fn handle_update(&self, update: &Value) -> Result<(), ChannelError> {
        if let Some(callback) = update.get("callback_query") {
            return self.handle_callback(callback).await;
        }

        let Some(message) = update.get("message") else {
            return Ok(());
        };
        let Some(chat_id) = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
        else {
            return Ok(());
        };

        if let Some(location) = message.get("location") {
            return self.handle_location(&chat_id, location).await;
        }
        if message.get("photo").is_some() {
            return self.handle_photo(&chat_id, message).await;
        }
        if let Some(text) = message.get("text").and_then(Value::as_str) {
            let text = text.trim();
            if let Some(command) = text.strip_prefix('/') {
                return self.handle_command(&chat_id, command).await;
            }
            return self.run_and_reply(&chat_id, text, false).await;
        }

        Ok(())
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn handle_command(&self, chat_id: &str, command: &str) -> Result<(), ChannelError> {
        let state = self.load_session(chat_id).await;
        let lang = state.context.language.clone();
        let command = command.split_whitespace().next().unwrap_or("");

        match command {
            "start" => {
                self.send_location_request(chat_id, &lang).await?;
                self.send_html(chat_id, &intro_text(&lang), Some(main_keyboard(&lang)))
                    .await
            }
            "help" => self.send_html(chat_id, &help_text(&lang), None).await,
            "profile" => {
                self.send_html(chat_id, &profile_template(&lang), Some(main_keyboard(&lang)))
                    .await
            }
            "location" => self.send_location_request(chat_id, &lang).await,
            "reset" => {
                // Wholesale replacement is allowed only here.
                if let Err(e) = self.store.save(&SessionState::new(chat_id)).await {
                    error!(session = chat_id, "Session reset failed: {e}");
                }
                self.send_html(
                    chat_id,
                    tr(
                        &lang,
                        "Session reset. Send your profile again.",
                        "सेशन रीसेट। प्रोफाइल फिर भेजें।",
                        "सेशन रीसेट. प्रोफाइल पुन्हा पाठवा.",
                    ),
                    Some(main_keyboard("en")),
                )
                .await
            }
            _ => self.send_html(chat_id, &help_text(&lang), None).await,
        }
    }

    // ── GPS shares ──────────────────────────────────────────────────

    async fn handle_location(&self, chat_id: &str, location: &Value) -> Result<(), ChannelError> {
        let (Some(lat), Some(lon)) = (
            location.get("latitude").and_then(Value::as_f64),
            location.get("longitude").and_then(Value::as_f64),
        ) else {
            return Ok(());
        };

        // Deterministic field set, applied before the turn runs.
        {
            let _guard = self.locks.acquire(chat_id).await;
            let mut state = self.load_session(chat_id).await;
            state.context.lat = Some(lat);
            state.context.lon = Some(lon);
            if state.context.location_text.is_none() {
                state.context.location_text = Some(format!("{lat:.5},{lon:.5}"));
            }
            let lang = state.context.language.clone();
            if let Err(e) = self.store.save(&state).await {
                error!(session = chat_id, "Saving shared location failed: {e}");
            }
            self.send_html(
                chat_id,
                tr(
                    &lang,
                    "Location saved. Generating updated advice…",
                    "लोकेशन सेव हो गई। नया सलाह तैयार कर रहे हैं…",
                    "लोकेशन सेव झाली. अपडेटेड सल्ला तयार करतोय…",
                ),
                None,
            )
            .await?;
        }

        self.run_and_reply(chat_id, &format!("{lat:.5},{lon:.5}"), false)
            .await
    }

    // ── Photos ──────────────────────────────────────────────────────

    async fn handle_photo(&self, chat_id: &str, message: &Value) -> Result<(), ChannelError> {
        let caption = message
            .get("caption")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();

        // The last entry is the largest rendition.
        let Some(file_id) = message
            .get("photo")
            .and_then(Value::as_array)
            .and_then(|sizes| sizes.last())
            .and_then(|p| p.get("file_id"))
            .and_then(Value::as_str)
        else {
            return Ok(());
        };

        let state = self.load_session(chat_id).await;
        let lang = state.context.language.clone();

        let local_path = match self.download_photo(chat_id, file_id).await {
            Ok(path) => path,
            Err(e) => {
                warn!(session = chat_id, "Photo download failed: {e}");
                return self
                    .send_html(
                        chat_id,
                        tr(
                            &lang,
                            "Image failed. Send a clear photo + short caption (symptoms + days).",
                            "फोटो प्रोसेस नहीं हुई। साफ फोटो + छोटा कैप्शन भेजें।",
                            "फोटो प्रोसेस नाही झाली. स्पष्ट फोटो + छोटं कॅप्शन पाठवा.",
                        ),
                        Some(main_keyboard(&lang)),
                    )
                    .await;
            }
        };

        {
            let _guard = self.locks.acquire(chat_id).await;
            let mut state = self.load_session(chat_id).await;
            if let Err(e) = self
                .store
                .save_image_record(
                    chat_id,
                    &local_path.to_string_lossy(),
                    (!caption.is_empty()).then_some(caption.as_str()),
                    Some(file_id),
                )
                .await
            {
                warn!(session = chat_id, "Recording image failed: {e}");
            }
            state.last_image = Some(ImageAsset {
                file_path: local_path.to_string_lossy().into_owned(),
                remote_file_id: Some(file_id.to_string()),
                caption: (!caption.is_empty()).then(|| caption.clone()),
                created_at_utc: utc_now_iso(),
            });
            state.image_diagnosis = None;
            if let Err(e) = self.store.save(&state).await {
                error!(session = chat_id, "Saving image asset failed: {e}");
            }
        }

        let user_text = if caption.is_empty() {
            DEFAULT_PHOTO_PROMPT
        } else {
            caption.as_str()
        };
        self.run_and_reply(chat_id, user_text, false).await
    }

    async fn download_photo(&self, chat_id: &str, file_id: &str) -> Result<PathBuf, ChannelError> {
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&json!({"file_id": file_id}))
            .send()
            .await
            .map_err(|e| ChannelError::MediaDownload(e.to_string()))?;
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::MediaDownload(e.to_string()))?;
        let remote_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MediaDownload("getFile returned no file_path".into()))?;

        let bytes = self
            .client
            .get(self.file_url(remote_path))
            .send()
            .await
            .map_err(|e| ChannelError::MediaDownload(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ChannelError::MediaDownload(e.to_string()))?;

        let chat_dir = self.media_dir.join(chat_id);
        tokio::fs::create_dir_all(&chat_dir)
            .await
            .map_err(|e| ChannelError::MediaDownload(e.to_string()))?;
        let local_path = chat_dir.join(format!("{}.jpg", Uuid::new_v4()));
        tokio::fs::write(&local_path, &bytes)
            .await
            .map_err(|e| ChannelError::MediaDownload(e.to_string()))?;

        Ok(local_path)
    }

    // ── Inline keyboard presses ─────────────────────────────────────

    async fn handle_callback(&self, callback: &Value) -> Result<(), ChannelError> {
        if let Some(callback_id) = callback.get("id").and_then(Value::as_str) {
            let _ = self
                .client
                .post(self.api_url("answerCallbackQuery"))
                .json(&json!({"callback_query_id": callback_id}))
                .send()
                .await;
        }

        let Some(chat_id) = callback
            .get("message")
            .and_then(|m| m.get("chat"))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
        else {
            return Ok(());
        };
        let Some(data) = callback.get("data").and_then(Value::as_str) else {
            return Ok(());
        };

        if let Some(code) = data.strip_prefix("lang:") {
            let code = code.trim().to_lowercase();
            {
                let _guard = self.locks.acquire(&chat_id).await;
                let mut state = self.load_session(&chat_id).await;
                state.context.language = code.clone();
                if let Err(e) = self.store.save(&state).await {
                    error!(session = %chat_id, "Saving language failed: {e}");
                }
            }
            return self
                .run_and_reply(&chat_id, &format!("{ACTION_SET_LANG_PREFIX}{code}"), false)
                .await;
        }

        if let Some(stage_word) = data.strip_prefix("stage:") {
            let stage_word = stage_word.trim().to_lowercase();
            {
                let _guard = self.locks.acquire(&chat_id).await;
                let mut state = self.load_session(&chat_id).await;
                if let Some(stage) = Stage::parse(&stage_word) {
                    state.context.stage = stage;
                }
                state.advisory = None;
                if let Err(e) = self.store.save(&state).await {
                    error!(session = %chat_id, "Saving stage failed: {e}");
                }
            }
            return self
                .run_and_reply(&chat_id, &format!("My stage is {stage_word}."), false)
                .await;
        }

        let state = self.load_session(&chat_id).await;
        let lang = state.context.language.clone();

        match data {
            "action:profile" => {
                self.send_html(&chat_id, &profile_template(&lang), Some(main_keyboard(&lang)))
                    .await
            }
            "action:location" => {
                self.send_location_request(&chat_id, &lang).await?;
                self.send_html(
                    &chat_id,
                    tr(
                        &lang,
                        "Send location: City/Village + District/State OR lat,lon (19.07,72.87)",
                        "स्थान: शहर/गांव + जिला/राज्य या lat,lon (19.07,72.87)",
                        "ठिकाण: शहर/गाव + जिल्हा/राज्य किंवा lat,lon (19.07,72.87)",
                    ),
                    Some(main_keyboard(&lang)),
                )
                .await
            }
            "action:symptoms" => {
                self.send_html(
                    &chat_id,
                    tr(
                        &lang,
                        "Symptoms: what you see + since how many days + irrigation frequency",
                        "लक्षण: क्या दिख रहा + कितने दिन + सिंचाई कितनी बार",
                        "लक्षणं: काय दिसतं + किती दिवस + पाणी किती वेळा",
                    ),
                    Some(main_keyboard(&lang)),
                )
                .await
            }
            "action:crop_reco" => self.action_turn(&chat_id, ACTION_CROP_RECO).await,
            "action:buy" => self.action_turn(&chat_id, ACTION_BUY).await,
            "action:schemes" => self.action_turn(&chat_id, ACTION_SCHEMES).await,
            "action:market" => self.action_turn(&chat_id, ACTION_MARKET).await,
            _ => Ok(()),
        }
    }

    /// A button-press turn starts from a cleared advisory so the render
    /// never echoes a previous deliverable.
    async fn action_turn(&self, chat_id: &str, marker: &str) -> Result<(), ChannelError> {
        {
            let _guard = self.locks.acquire(chat_id).await;
            let mut state = self.load_session(chat_id).await;
            state.advisory = None;
            if let Err(e) = self.store.save(&state).await {
                error!(session = chat_id, "Clearing advisory failed: {e}");
            }
        }
        self.run_and_reply(chat_id, marker, false).await
    }

    // ── Turn execution ──────────────────────────────────────────────

    async fn load_session(&self, chat_id: &str) -> SessionState {
        match self.store.load(chat_id).await {
            Ok(state) => state,
            Err(e) => {
                // Store trouble must not block the user indefinitely.
                error!(session = chat_id, "Session load failed, using fresh state: {e}");
                SessionState::new(chat_id)
            }
        }
    }

    /// Run one orchestrator turn under the session lock and send the reply.
    pub async fn run_and_reply(
        &self,
        chat_id: &str,
        user_text: &str,
        digest: bool,
    ) -> Result<(), ChannelError> {
        let _guard = self.locks.acquire(chat_id).await;

        let state = self.load_session(chat_id).await;
        let new_state = self.advisor.run_turn(&state, user_text).await;
        if let Err(e) = self.store.save(&new_state).await {
            error!(session = chat_id, "Session save failed: {e}");
        }

        let reply = render::format_reply(&new_state, digest);
        let keyboard = main_keyboard(&new_state.context.language);
        self.send_html(chat_id, &reply, Some(keyboard)).await
    }

    // ── Sending ─────────────────────────────────────────────────────

    /// POST a pre-built body to the `sendMessage` endpoint.
    async fn post_send_message(&self, body: Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage failed ({detail})"),
            });
        }
        Ok(())
    }

    async fn send_location_request(&self, chat_id: &str, lang: &str) -> Result<(), ChannelError> {
        let prompt = tr(
            lang,
            "To give hyper-local advice, please share your exact location (tap button).",
            "सटीक सलाह के लिए कृपया अपनी लोकेशन भेजें (बटन दबाएँ)।",
            "अचूक सल्ल्यासाठी कृपया तुमची लोकेशन पाठवा (बटन दाबा).",
        );
        let button = tr(lang, "Share Location", "लोकेशन भेजें", "लोकेशन पाठवा");
        let body = json!({
            "chat_id": chat_id,
            "text": prompt,
            "reply_markup": {
                "keyboard": [[{"text": button, "request_location": true}]],
                "resize_keyboard": true,
                "one_time_keyboard": true,
            },
        });
        self.post_send_message(body).await
    }

    /// Send a message, HTML first with plain-text fallback. Splits long
    /// messages that exceed Telegram's 4096-char limit.
    async fn send_html(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            // Keyboard only on the final chunk.
            let markup = if i == last { keyboard.clone() } else { None };
            self.send_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<Value>,
    ) -> Result<(), ChannelError> {
        let mut html_body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(kb) = &keyboard {
            html_body["reply_markup"] = kb.clone();
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&html_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            return Ok(());
        }
        let html_status = resp.status();
        warn!(status = ?html_status, "sendMessage with HTML failed; retrying without parse_mode");

        let mut plain_body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(kb) = keyboard {
            plain_body["reply_markup"] = kb;
        }
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage failed (html: {html_status}, plain: {detail})"),
            });
        }
        Ok(())
    }
}

// ── Keyboard & templates ────────────────────────────────────────────

/// The main inline keyboard: language row, stage rows, action rows. Buttons
/// are the only producers of the reserved markers.
fn main_keyboard(lang: &str) -> Value {
    let stage_button = |label: &str, stage: &str| {
        json!({"text": label, "callback_data": format!("stage:{stage}")})
    };

    json!({
        "inline_keyboard": [
            [
                {"text": "English", "callback_data": "lang:en"},
                {"text": "हिंदी", "callback_data": "lang:hi"},
                {"text": "मराठी", "callback_data": "lang:mr"},
            ],
            [
                stage_button(tr(lang, "Sowing", "बुवाई", "पेरणी"), "sowing"),
                stage_button(tr(lang, "Germination", "अंकुरण", "अंकुरण"), "germination"),
            ],
            [
                stage_button(tr(lang, "Vegetative", "वृद्धि", "वाढ"), "vegetative"),
                stage_button(tr(lang, "Flowering", "फूल", "फुलोरा"), "flowering"),
            ],
            [
                stage_button(tr(lang, "Fruiting", "फल", "फळ"), "fruiting"),
                stage_button(tr(lang, "Maturity", "पकना", "पक्वता"), "maturity"),
            ],
            [stage_button(tr(lang, "Harvest", "कटाई", "कापणी"), "harvest")],
            [{"text": tr(lang, "Set Profile", "प्रोफाइल सेट", "प्रोफाइल सेट"), "callback_data": "action:profile"}],
            [{"text": tr(lang, "Update Location", "स्थान अपडेट", "ठिकाण अपडेट"), "callback_data": "action:location"}],
            [{"text": tr(lang, "Report Symptoms", "लक्षण रिपोर्ट", "लक्षणं रिपोर्ट"), "callback_data": "action:symptoms"}],
            [
                {"text": tr(lang, "Crop Suggestions", "फसल सुझाव", "पीक सुचना"), "callback_data": "action:crop_reco"},
                {"text": tr(lang, "Buy Inputs", "खरीद लिंक", "खरेदी लिंक"), "callback_data": "action:buy"},
            ],
            [
                {"text": tr(lang, "Govt Schemes", "सरकारी योजनाएँ", "सरकारी योजना"), "callback_data": "action:schemes"},
                {"text": tr(lang, "Market Prices", "बाजार भाव", "बाजार भाव"), "callback_data": "action:market"},
            ],
        ],
    })
}

fn intro_text(lang: &str) -> String {
    format!(
        "<b>{}</b>\n{}",
        tr(lang, "Farm Guide", "कृषि मार्गदर्शक", "कृषी मार्गदर्शक"),
        tr(
            lang,
            "Send: name, crop+stage, land, location. Upload crop photo for diagnosis.",
            "नाम, फसल+चरण, जमीन, स्थान भेजें। फोटो अपलोड करें।",
            "नाव, पीक+अवस्था, जमीन, ठिकाण पाठवा. फोटो अपलोड करा.",
        )
    )
}

fn help_text(lang: &str) -> String {
    format!(
        "<b>Help</b>\n{}",
        tr(
            lang,
            "Example: My name is Ramesh. Rice germination. 2 acres. Pune.\n/start /profile /reset /help /location",
            "उदाहरण: मेरा नाम रमेश। धान अंकुरण। 2 एकड़। पुणे।\n/start /profile /reset /help /location",
            "उदा: माझं नाव रमेश. भात अंकुरण. 2 एकर. पुणे.\n/start /profile /reset /help /location",
        )
    )
}

fn profile_template(lang: &str) -> String {
    format!(
        "<b>{}</b>\n{}",
        tr(lang, "Set Profile", "प्रोफाइल सेट", "प्रोफाइल सेट"),
        tr(
            lang,
            "Copy+edit:\n\nMy name is ___\nCrop: ___\nStage: ___\nLand: ___ acres/hectare\nLocation: ___ (or 19.07,72.87)\n",
            "कॉपी+एडिट:\n\nमेरा नाम ___\nफसल: ___\nचरण: ___\nजमीन: ___\nस्थान: ___ (या 19.07,72.87)\n",
            "कॉपी+एडिट:\n\nमाझं नाव ___\nपीक: ___\nअवस्था: ___\nजमीन: ___\nठिकाण: ___ (किंवा 19.07,72.87)\n",
        )
    )
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &remaining[..cut];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .unwrap_or(cut);
        // Never split at position 0 (infinite loop guard).
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Spawn the daily digest sweep: every `interval`, run a digest turn for
/// every stored session and push the rendered result.
pub fn spawn_digest_task(bot: Arc<TelegramBot>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip the immediate first tick.
        loop {
            ticker.tick().await;
            let session_ids = match bot.store.list_session_ids().await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Digest sweep could not list sessions: {e}");
                    continue;
                }
            };
            info!(sessions = session_ids.len(), "Running digest sweep");
            for chat_id in session_ids {
                if let Err(e) = bot.run_and_reply(&chat_id, ACTION_DIGEST, true).await {
                    warn!(session = %chat_id, "Digest turn failed: {e}");
                }
            }
        }
    })
}

// ── Tests ───────────────────────────────────────────────────────────
