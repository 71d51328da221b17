use std::path::PathBuf;

use crate::{
    env_f64, env_list, env_optional, env_required, env_u64, env_usize, ConfigError, EnvSource,
    ToolRequest,
};

pub(crate) const DEFAULT_ARCADE_BASE_URL: &str = "https://api.arcade.dev";
pub(crate) const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_THREAD_ID: &str = "1";
pub(crate) const DEFAULT_TOOL_LIMIT: usize = 100;
pub(crate) const DEFAULT_MAX_STEPS: usize = 25;
pub(crate) const DEFAULT_TOOLKITS: &[&str] = &["GoogleDrive"];

/// Drive tools that change state; each call needs an explicit yes.
pub(crate) const DEFAULT_APPROVAL_TOOLS: &[&str] = &[
    "GoogleDrive_CreateFolder",
    "GoogleDrive_UploadFile",
    "GoogleDrive_RenameFile",
    "GoogleDrive_ShareFile",
    "GoogleDrive_MoveFile",
];

pub(crate) const DRIVE_SYSTEM_PROMPT: &str = "\
# Introduction
Welcome to your Google Drive Assistant! This agent is designed to help you efficiently manage your Google Drive files and folders. Whether you need to create, upload, rename, share, or download files, this ReAct agent will guide you through the necessary steps using a variety of tools available for interaction with Google Drive.

# Instructions
1. Always seek to understand the user's intent and what they wish to accomplish with their Google Drive.
2. Utilize the various tools at your disposal to perform tasks, such as creating folders, uploading files, moving files, and downloading files, based on user requests.
3. Follow the workflows outlined below for structured task completion.
4. Keep the user informed about the actions being taken and any necessary information required (like folder names, file URLs, etc.).
5. Encourage user-driven file selection and authorization when necessary through the Google File Picker.

# Workflows

## 1. Create a New Folder
- **Step 1**: Ask the user for the name of the folder and a parent folder path if applicable.
- **Step 2**: Use `GoogleDrive_CreateFolder` to create the new folder.

## 2. Upload a File
- **Step 1**: Inquire about the file name, URL, and the folder path (if any) where the file should be uploaded.
- **Step 2**: Use `GoogleDrive_UploadFile` to upload the file to the specified location.

## 3. Rename a File or Folder
- **Step 1**: Request the current path or ID of the file/folder to be renamed and the new name.
- **Step 2**: Use `GoogleDrive_RenameFile` to rename the specified file or folder.

## 4. Share a File or Folder
- **Step 1**: Gather the file path or ID, email addresses of users to share with, and the desired permission role.
- **Step 2**: Use `GoogleDrive_ShareFile` to share the specified file or folder.

## 5. Download a File
- **Step 1**: Ask for the file path or ID of the file to download.
- **Step 2**: Use `GoogleDrive_DownloadFile` or `GoogleDrive_DownloadFileChunk` (if the file is large) to download the specified file.

## 6. Move a File or Folder
- **Step 1**: Collect the source file path/ID, destination folder path/ID, and optional new filename.
- **Step 2**: Use `GoogleDrive_MoveFile` to move the file or folder to a new location.

## 7. Search for Files
- **Step 1**: Request the search query and any folder or file type filters from the user.
- **Step 2**: Use `GoogleDrive_SearchFiles` to find and return the relevant files.

## 8. Get File Tree Structure
- **Step 1**: Ask the user if they want the full tree structure or to limit it to shared drives.
- **Step 2**: Use `GoogleDrive_GetFileTreeStructure` to retrieve and display the file/folder hierarchy.

## 9. Check User Profile
- **Step 1**: Call `GoogleDrive_WhoAmI` to retrieve information about the user, such as their profile and Google Drive environment.
- **Step 2**: Present the user with their relevant information for any further actions needed.

By following these workflows, the Google Drive Assistant will operate efficiently and effectively, ensuring users achieve their file management goals seamlessly.";

#[derive(Debug, Clone)]
pub(crate) struct ArcadeConfig {
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    /// Long-poll window per `auth/status` request, in seconds.
    pub(crate) auth_wait_secs: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiConfig {
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) timeout_secs: u64,
    pub(crate) max_retries: usize,
    pub(crate) retry_base: f64,
    pub(crate) retry_max: f64,
    pub(crate) temperature: Option<f64>,
}

/// Everything the process needs, resolved once at startup and handed to
/// constructors explicitly.
#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub(crate) user_id: String,
    pub(crate) model: String,
    pub(crate) thread_id: String,
    pub(crate) system_prompt: String,
    pub(crate) toolkits: Vec<String>,
    pub(crate) isolated_tools: Vec<String>,
    pub(crate) tool_limit: usize,
    pub(crate) approval_tools: Vec<String>,
    pub(crate) max_steps: usize,
    pub(crate) session_log_dir: Option<PathBuf>,
    pub(crate) arcade: ArcadeConfig,
    pub(crate) openai: OpenAiConfig,
}

impl AppConfig {
    pub(crate) fn from_env(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        // Order matters: identity, then model, then keys.
        let user_id = env_required(
            env,
            "ARCADE_USER_ID",
            "Set it to the identity that authorizes each service.",
        )?;
        let model = env_required(env, "OPENAI_MODEL", "Set it to the model the agent should use.")?;
        let arcade_key = env_required(env, "ARCADE_API_KEY", "Create one in the Arcade dashboard.")?;
        let openai_key = env_required(env, "OPENAI_API_KEY", "It is required to call the model.")?;

        let system_prompt = match env_optional(env, "AGENT_SYSTEM_PROMPT_FILE") {
            Some(path) => std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::PromptFile { path, source })?,
            None => DRIVE_SYSTEM_PROMPT.to_string(),
        };

        let temperature = match env_optional(env, "OPENAI_TEMPERATURE") {
            Some(value) => Some(value.trim().parse::<f64>().map_err(|_| ConfigError::Invalid {
                name: "OPENAI_TEMPERATURE",
                value,
            })?),
            None => None,
        };

        Ok(Self {
            user_id,
            model,
            thread_id: env_optional(env, "AGENT_THREAD_ID")
                .unwrap_or_else(|| DEFAULT_THREAD_ID.to_string()),
            system_prompt,
            toolkits: env_list(env, "AGENT_TOOLKITS")
                .unwrap_or_else(|| DEFAULT_TOOLKITS.iter().map(|s| s.to_string()).collect()),
            isolated_tools: env_list(env, "AGENT_TOOLS").unwrap_or_default(),
            tool_limit: env_usize(env, "AGENT_TOOL_LIMIT", DEFAULT_TOOL_LIMIT)?,
            approval_tools: env_list(env, "AGENT_APPROVAL_TOOLS")
                .unwrap_or_else(|| DEFAULT_APPROVAL_TOOLS.iter().map(|s| s.to_string()).collect()),
            max_steps: env_usize(env, "AGENT_MAX_STEPS", DEFAULT_MAX_STEPS)?,
            session_log_dir: env_optional(env, "SESSION_LOG_DIR").map(PathBuf::from),
            arcade: ArcadeConfig {
                base_url: env_optional(env, "ARCADE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_ARCADE_BASE_URL.to_string()),
                api_key: arcade_key,
                auth_wait_secs: env_u64(env, "ARCADE_AUTH_WAIT", 59)?,
            },
            openai: OpenAiConfig {
                base_url: env_optional(env, "OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                api_key: openai_key,
                timeout_secs: env_u64(env, "OPENAI_TIMEOUT", 120)?,
                max_retries: env_usize(env, "OPENAI_MAX_RETRIES", 2)?,
                retry_base: env_f64(env, "OPENAI_RETRY_BASE", 0.5)?,
                retry_max: env_f64(env, "OPENAI_RETRY_MAX", 4.0)?,
                temperature,
            },
        })
    }

    pub(crate) fn tool_request(&self) -> ToolRequest {
        ToolRequest {
            toolkits: self.toolkits.clone(),
            tools: self.isolated_tools.clone(),
            user_id: self.user_id.clone(),
            limit: self.tool_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn full_env() -> HashMap<String, String> {
        [
            ("ARCADE_USER_ID", "me@example.com"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("ARCADE_API_KEY", "arc_test"),
            ("OPENAI_API_KEY", "sk-test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = AppConfig::from_env(&full_env()).unwrap();
        assert_eq!(config.user_id, "me@example.com");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.thread_id, DEFAULT_THREAD_ID);
        assert_eq!(config.toolkits, vec!["GoogleDrive".to_string()]);
        assert!(config.isolated_tools.is_empty());
        assert_eq!(config.tool_limit, 100);
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.arcade.base_url, DEFAULT_ARCADE_BASE_URL);
        assert_eq!(config.openai.max_retries, 2);
        assert!(config.openai.temperature.is_none());
        assert!(config.system_prompt.starts_with("# Introduction"));
        assert!(config.approval_tools.contains(&"GoogleDrive_ShareFile".to_string()));
    }

    #[test]
    fn missing_user_id_is_reported_first() {
        let mut env = full_env();
        env.remove("ARCADE_USER_ID");
        env.remove("OPENAI_MODEL");
        let err = AppConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "ARCADE_USER_ID", .. }));
        assert!(err.to_string().starts_with("Missing ARCADE_USER_ID."));
    }

    #[test]
    fn missing_model_is_reported() {
        let mut env = full_env();
        env.remove("OPENAI_MODEL");
        let err = AppConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "OPENAI_MODEL", .. }));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut env = full_env();
        env.insert("AGENT_TOOLKITS".into(), "GoogleDrive,Gmail".into());
        env.insert("AGENT_TOOLS".into(), "Slack.SendMessage".into());
        env.insert("AGENT_TOOL_LIMIT".into(), "10".into());
        env.insert("AGENT_THREAD_ID".into(), "thread-9".into());
        env.insert("OPENAI_TEMPERATURE".into(), "0.2".into());
        let config = AppConfig::from_env(&env).unwrap();
        let request = config.tool_request();
        assert_eq!(request.toolkits, vec!["GoogleDrive".to_string(), "Gmail".to_string()]);
        assert_eq!(request.tools, vec!["Slack.SendMessage".to_string()]);
        assert_eq!(request.limit, 10);
        assert_eq!(request.user_id, "me@example.com");
        assert_eq!(config.thread_id, "thread-9");
        assert_eq!(config.openai.temperature, Some(0.2));
    }

    #[test]
    fn bad_temperature_is_invalid() {
        let mut env = full_env();
        env.insert("OPENAI_TEMPERATURE".into(), "warm".into());
        let err = AppConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "OPENAI_TEMPERATURE", .. }));
    }

    #[test]
    fn unreadable_prompt_file_is_an_error() {
        let mut env = full_env();
        env.insert(
            "AGENT_SYSTEM_PROMPT_FILE".into(),
            "/nonexistent/drive-agent/prompt.md".into(),
        );
        let err = AppConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::PromptFile { .. }));
    }
}
