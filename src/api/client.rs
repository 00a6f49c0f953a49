//! reqwest implementation of the Open WebUI REST API

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatForm, ChatResponse, ChatSummary,
    CompletionMessage, FileInfo, FileUploadResponse, ModelInfo, ModelsResponse, Role,
    SignInRequest, SignInResponse,
};
use super::{ChatApi, CompletionSettings};
use crate::config::ServerConfig;
use crate::error::{ChatDroidError, StoreResult};

/// HTTP client for an Open WebUI server
///
/// Cloning is cheap; clones share the session token and completion
/// settings.
///
/// # Examples
///
/// ```
/// use chatdroid::api::OpenWebUiClient;
/// use chatdroid::config::ServerConfig;
///
/// let client = OpenWebUiClient::new(&ServerConfig::default()).unwrap();
/// assert!(client.base_url().as_str().ends_with("/api/v1/"));
/// assert!(client.token().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct OpenWebUiClient {
    client: Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
    completion: Arc<RwLock<CompletionSettings>>,
}

impl OpenWebUiClient {
    /// Build a client from server configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::Config` if the base URL is invalid or the
    /// HTTP client cannot be created.
    pub fn new(config: &ServerConfig) -> StoreResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ChatDroidError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized Open WebUI client: base_url={}", base_url);

        Ok(Self {
            client,
            base_url,
            token: Arc::new(RwLock::new(None)),
            completion: Arc::new(RwLock::new(CompletionSettings::default())),
        })
    }

    /// Base URL every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Install or clear the bearer token
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    /// Current bearer token, if signed in
    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    /// Replace the settings used for completion requests
    pub fn set_completion_settings(&self, settings: CompletionSettings) {
        if let Ok(mut guard) = self.completion.write() {
            *guard = settings;
        }
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        self.completion
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChatDroidError::Config(format!("Base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> StoreResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.token() {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> StoreResult<Response> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("{} failed: {}", context, e);
            ChatDroidError::Network(format!("{}: {}", context, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("{} returned error {}: {}", context, status, body);
            return Err(ChatDroidError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> StoreResult<T> {
        let response = self.send(builder, context).await?;
        decode(response, context).await
    }

    /// Sign in with email and password
    ///
    /// # Errors
    ///
    /// Rejected credentials (400, 401, 403) map to
    /// `ChatDroidError::Authentication`; other failures are remote errors.
    pub async fn sign_in(&self, email: &str, password: &str) -> StoreResult<SignInResponse> {
        tracing::debug!("Signing in as {}", email);
        let body = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let builder = self.request(Method::POST, &["auths", "signin"])?.json(&body);
        match self.send_json(builder, "Sign in").await {
            Err(ChatDroidError::Status { status, body }) if matches!(status, 400 | 401 | 403) => {
                Err(ChatDroidError::Authentication(if body.is_empty() {
                    format!("sign in rejected with status {}", status)
                } else {
                    body
                }))
            }
            other => other,
        }
    }

    /// Upload a file as multipart form data
    pub async fn upload_file(&self, path: &Path, content_type: &str) -> StoreResult<FileUploadResponse> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(|e| ChatDroidError::File(format!("Invalid content type {}: {}", content_type, e)))?;
        let form = multipart::Form::new().part("file", part);

        let builder = self.request(Method::POST, &["files", ""])?.multipart(form);
        self.send_json(builder, "Upload file").await
    }

    /// Files uploaded by the current user
    pub async fn list_files(&self) -> StoreResult<Vec<FileInfo>> {
        let builder = self.request(Method::GET, &["files", ""])?;
        self.send_json(builder, "List files").await
    }

    /// Metadata of one file
    pub async fn get_file(&self, file_id: &str) -> StoreResult<FileInfo> {
        let builder = self.request(Method::GET, &["files", file_id])?;
        not_found_as(self.send_json(builder, "Get file").await, "file", file_id)
    }

    pub async fn delete_file(&self, file_id: &str) -> StoreResult<()> {
        let builder = self.request(Method::DELETE, &["files", file_id])?;
        self.send(builder, "Delete file").await?;
        Ok(())
    }

    /// Stream a file's content to `dest`, returning the number of bytes written
    pub async fn download_file(&self, file_id: &str, dest: &Path) -> StoreResult<u64> {
        let builder = self.request(Method::GET, &["files", file_id, "content"])?;
        let response = not_found_as(self.send(builder, "Download file").await, "file", file_id)?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ChatDroidError::Network(format!("Download interrupted: {}", e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!("Downloaded {} bytes of file {}", written, file_id);
        Ok(written)
    }
}

#[async_trait]
impl ChatApi for OpenWebUiClient {
    async fn fetch_chats(&self) -> StoreResult<Vec<ChatSummary>> {
        let builder = self.request(Method::GET, &["chats", ""])?;
        let chats: Vec<ChatSummary> = self.send_json(builder, "Fetch chats").await?;
        tracing::debug!("Fetched {} chats", chats.len());
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: &str) -> StoreResult<ChatResponse> {
        let builder = self.request(Method::GET, &["chats", chat_id])?;
        not_found_as(self.send_json(builder, "Get chat").await, "chat", chat_id)
    }

    async fn create_chat(&self, title: &str) -> StoreResult<ChatResponse> {
        let builder = self
            .request(Method::POST, &["chats", "new"])?
            .json(&ChatForm::new_chat(title));
        let chat: ChatResponse = self.send_json(builder, "Create chat").await?;
        tracing::info!("Created chat {} ({})", chat.id, chat.title);
        Ok(chat)
    }

    async fn delete_chat(&self, chat_id: &str) -> StoreResult<bool> {
        let builder = self.request(Method::DELETE, &["chats", chat_id])?;
        self.send_json(builder, "Delete chat").await
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> StoreResult<String> {
        let settings = self.completion_settings();
        let request = ChatCompletionRequest {
            model: settings.model,
            messages: vec![CompletionMessage {
                role: Role::User,
                content: content.to_string(),
            }],
            stream: false,
            chat_id: Some(chat_id.to_string()),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };

        tracing::debug!("Sending completion request for chat {} with model {}", chat_id, request.model);

        let builder = self
            .request(Method::POST, &["chat", "completions"])?
            .json(&request);
        let response: ChatCompletionResponse = self.send_json(builder, "Chat completion").await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                "Completion usage: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatDroidError::Payload("Completion response had no choices".to_string()))
    }

    async fn search_chats(&self, text: &str) -> StoreResult<Vec<ChatSummary>> {
        let builder = self
            .request(Method::GET, &["chats", "search"])?
            .query(&[("text", text)]);
        self.send_json(builder, "Search chats").await
    }

    async fn toggle_pin_chat(&self, chat_id: &str) -> StoreResult<ChatResponse> {
        let builder = self.request(Method::POST, &["chats", chat_id, "pin"])?;
        not_found_as(self.send_json(builder, "Pin chat").await, "chat", chat_id)
    }

    async fn toggle_archive_chat(&self, chat_id: &str) -> StoreResult<ChatResponse> {
        let builder = self.request(Method::POST, &["chats", chat_id, "archive"])?;
        not_found_as(self.send_json(builder, "Archive chat").await, "chat", chat_id)
    }

    async fn list_models(&self) -> StoreResult<Vec<ModelInfo>> {
        let builder = self.request(Method::GET, &["models"])?;
        let response: ModelsResponse = self.send_json(builder, "List models").await?;
        Ok(response.data)
    }
}

fn normalize_base_url(raw: &str) -> StoreResult<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| ChatDroidError::Config(format!("Invalid server URL '{}': {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> StoreResult<T> {
    let body = response.text().await.map_err(|e| {
        tracing::warn!("Failed to read {} response body: {}", context, e);
        ChatDroidError::Network(format!("{}: {}", context, e))
    })?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::error!("Failed to parse {} response: {}", context, e);
        ChatDroidError::Payload(format!("{}: {}", context, e))
    })
}

fn not_found_as<T>(result: StoreResult<T>, kind: &str, id: &str) -> StoreResult<T> {
    match result {
        Err(ChatDroidError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
            Err(ChatDroidError::NotFound(format!("{} {}", kind, id)))
        }
        other => other,
    }
}
