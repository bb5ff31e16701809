use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Backend Args ---
    /// Site root the chat and page endpoints live under (e.g., http://127.0.0.1:8000)
    #[arg(long, env = "WIDGET_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Backend flavour to talk to (actionable, https, standalone, v1, v2, club-creation, enhanced, professional, ultimate)
    #[arg(short = 'v', long, env = "WIDGET_VARIANT", default_value = "v2")]
    pub variant: String,

    /// Optional JSON widget config; replaces the variant preset entirely.
    #[arg(long, env = "WIDGET_CONFIG_PATH")]
    pub config_path: Option<String>,

    /// CSRF token sent as X-CSRFToken with every request.
    #[arg(long, env = "WIDGET_CSRF_TOKEN")]
    pub csrf_token: Option<String>,

    /// E-mail forwarded to backends that ask for one.
    #[arg(long, env = "WIDGET_USER_EMAIL")]
    pub user_email: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "WIDGET_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    // --- Client State Args ---
    /// JSON file for preferences, tokens and mirrored history. In-memory when unset.
    #[arg(long, env = "WIDGET_STORE_PATH")]
    pub store_path: Option<String>,

    /// Messages kept in the conversation before the oldest are dropped.
    #[arg(long, env = "WIDGET_MAX_MESSAGES")]
    pub max_messages: Option<usize>,

    /// Mirror the conversation into the store so it survives restarts.
    #[arg(long, env = "WIDGET_PERSIST_HISTORY", default_value = "false")]
    pub persist_history: bool,

    /// Page path used as the return target of login redirects.
    #[arg(long, env = "WIDGET_PAGE_PATH", default_value = "/")]
    pub page_path: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

/// One line typed into the terminal client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Open,
    Close,
    Toggle,
    Theme,
    Reset,
    Quick(usize),
    Guide,
    Validate,
    Draft,
    Recommendations,
    Rate(u64, crate::actions::Rating),
    Club(u64, crate::actions::ClubAction),
    Festival(u64, crate::actions::FestivalDecision),
    FestivalJoin(u64, u64),
    Allies,
    Login(String, String),
    Register(Vec<(String, String)>),
    Verify(String),
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
/open /close /toggle   show or hide the chat panel
/theme                 switch between light and dark
/reset                 start a new conversation
/quick N               send quick reply number N
/guide /validate       club creation guide, check the club data gathered so far
/draft                 show the club data gathered so far
/recs                  load recommendations
/rate ID like|dislike  rate a recommended club
/like ID /unlike ID /join ID /leave ID
/approve ID /reject ID festival join requests
/fest ID CLUB          ask for CLUB to take part in festival ID
/allies                list yourself as searching for allies
/login USER PASSWORD   store an API token for page actions
/register k=v ...      sign up (username=, email=, phone=, password=, password2=)
/verify CODE           confirm the e-mailed sign-up code
/quit";

pub fn parse_command(line: &str) -> Command {
    use crate::actions::{ ClubAction, FestivalDecision, Rating };

    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next();
    let id = arg.and_then(|a| a.parse::<u64>().ok());

    match (name.as_str(), id) {
        ("open", _) => Command::Open,
        ("close", _) => Command::Close,
        ("toggle", _) => Command::Toggle,
        ("theme", _) => Command::Theme,
        ("reset", _) => Command::Reset,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        ("quick", Some(n)) if n > 0 => Command::Quick((n - 1) as usize),
        ("guide", _) => Command::Guide,
        ("validate", _) => Command::Validate,
        ("draft", _) => Command::Draft,
        ("recs", _) => Command::Recommendations,
        ("allies", _) => Command::Allies,
        ("rate", Some(id)) =>
            match parts.next() {
                Some("like") => Command::Rate(id, Rating::Like),
                Some("dislike") => Command::Rate(id, Rating::Dislike),
                _ => Command::Unknown(line.to_string()),
            }
        ("fest", Some(id)) =>
            match parts.next().and_then(|c| c.parse::<u64>().ok()) {
                Some(club) => Command::FestivalJoin(id, club),
                None => Command::Unknown(line.to_string()),
            }
        ("like", Some(id)) => Command::Club(id, ClubAction::Like),
        ("unlike", Some(id)) => Command::Club(id, ClubAction::Unlike),
        ("join", Some(id)) => Command::Club(id, ClubAction::Join),
        ("leave", Some(id)) => Command::Club(id, ClubAction::Leave),
        ("approve", Some(id)) => Command::Festival(id, FestivalDecision::Approve),
        ("reject", Some(id)) => Command::Festival(id, FestivalDecision::Reject),
        ("login", _) =>
            match (arg, parts.next()) {
                (Some(user), Some(pass)) => Command::Login(user.to_string(), pass.to_string()),
                _ => Command::Unknown(line.to_string()),
            }
        ("verify", _) =>
            match arg {
                Some(code) => Command::Verify(code.to_string()),
                None => Command::Unknown(line.to_string()),
            }
        ("register", _) => {
            let fields: Option<Vec<_>> = arg
                .into_iter()
                .chain(parts)
                .map(|pair| pair.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
                .collect();
            match fields {
                Some(fields) if !fields.is_empty() => Command::Register(fields),
                _ => Command::Unknown(line.to_string()),
            }
        }
        _ => Command::Unknown(line.to_string()),
    }
}
