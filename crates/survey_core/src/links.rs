use shared::domain::DocumentId;
use url::Url;

const RESUME_SEGMENT: &str = "survey";

/// Builds the links a participant uses to pick a session back up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeLinks {
    base: Url,
}

impl ResumeLinks {
    pub fn new(public_base_url: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(public_base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resume_url(&self, id: &DocumentId) -> Result<Url, url::ParseError> {
        self.base.join(&format!("{RESUME_SEGMENT}/{id}"))
    }
}

/// Accepts either a bare document id or a full resumption link.
pub fn parse_resume_id(raw: &str) -> Option<DocumentId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Ok(url) = Url::parse(raw) else {
        return (!raw.contains('/')).then(|| DocumentId::from(raw));
    };

    let mut segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let id = segments.pop()?;
    (segments.last() == Some(&RESUME_SEGMENT)).then(|| DocumentId::from(id))
}
