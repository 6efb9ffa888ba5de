//! Chromium lifecycle: launch configuration, handler loop and teardown.

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Browser launch preferences.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Extra arguments appended to the Chrome command line.
    pub chrome_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_args: Vec::new(),
        }
    }
}

pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub page: Page,
    user_data_dir: Option<PathBuf>,
    cleanup_user_data_dir: bool,
}

impl CdpClient {
    pub async fn launch(
        options: &LaunchOptions,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut config_builder = BrowserConfig::builder();
        config_builder = config_builder.no_sandbox(); // docker/CI/restricted envs
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir()?;
        config_builder = config_builder.user_data_dir(&user_data_dir);

        if options.headless {
            tracing::info!("Launching browser in headless mode");
        } else {
            tracing::info!("Launching browser in headed mode");
            config_builder = config_builder.with_head();
        }

        // Support custom Chrome path via CHROME_BIN environment variable
        if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
            tracing::info!("Using custom Chrome binary: {}", chrome_bin);
            config_builder = config_builder.chrome_executable(chrome_bin);
        }

        for arg in &options.chrome_args {
            config_builder = config_builder.arg(arg);
        }

        let (browser, mut handler) = Browser::launch(
            config_builder
                .build()
                .map_err(|e| format!("Failed to build browser config: {}", e))?,
        )
        .await
        .map_err(|e| format!("Failed to launch browser: {}", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    tracing::error!("Browser handler error (ignoring): {}", e);
                    continue;
                }
            }
            tracing::info!("Browser handler task ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to create page: {}", e))?;

        // Auto-accept JavaScript dialogs so they never block evaluation.
        let mut dialog_events = page
            .event_listener::<chromiumoxide::cdp::browser_protocol::page::EventJavascriptDialogOpening>()
            .await
            .map_err(|e| format!("Failed to subscribe to dialog events: {}", e))?;

        let page_clone = page.clone();
        tokio::spawn(async move {
            while let Some(event) = dialog_events.next().await {
                tracing::info!(
                    "Handling JavaScript Dialog: {} ({:?})",
                    event.message,
                    event.r#type
                );
                let cmd =
                    chromiumoxide::cdp::browser_protocol::page::HandleJavaScriptDialogParams::new(
                        true,
                    );
                if let Err(e) = page_clone.execute(cmd).await {
                    tracing::error!("Failed to handle/accept dialog: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            page,
            user_data_dir: Some(user_data_dir),
            cleanup_user_data_dir,
        })
    }

    pub async fn close(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.browser
            .close()
            .await
            .map_err(|e| format!("Error closing browser: {}", e))?;
        self.handler_task
            .await
            .map_err(|e| format!("Error awaiting handler: {}", e))?;

        if self.cleanup_user_data_dir {
            if let Some(dir) = &self.user_data_dir {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    tracing::debug!("Failed to clean up user-data-dir {}: {}", dir.display(), e);
                }
            }
        }

        Ok(())
    }
}

fn resolve_user_data_dir() -> Result<(PathBuf, bool), Box<dyn std::error::Error + Send + Sync>> {
    if let Ok(dir) = std::env::var("COLLOQUY_USER_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path)?;
        tracing::info!(
            "Using user data dir from COLLOQUY_USER_DATA_DIR: {}",
            path.display()
        );
        return Ok((path, false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("System clock error: {}", e))?
        .as_nanos();
    let unique = format!("colloquy-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::info!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}
