use std::sync::Arc;

use chrono::Utc;
use rand::thread_rng;
use shared::{
    domain::{DocumentId, ImageId, ScreenSize},
    protocol::{AnalyticsEvent, EmailRequest, LogRecord, LogType},
};
use storage::DocumentStore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

pub mod catalog;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod http;
pub mod layout;
pub mod links;
pub mod resume;
pub mod services;
pub mod validation;

pub use catalog::ImageCatalog;
pub use controller::{AnswerEdit, BranchChoice, Clock, SessionInfo, StepController, Transition};
pub use error::{ControllerError, SurveyError};
pub use gateway::PersistenceGateway;
pub use layout::{Resolution, Screen};
pub use links::{parse_resume_id, ResumeLinks};
pub use services::{Analytics, GeoLocator, IpLookup, Mailer};

const PAGE_TITLE: &str = "Survey Form";
const EMAIL_FROM_NAME: &str = "Your Survey App";
const DEFAULT_RECIPIENT_NAME: &str = "Valued Participant";

/// Everything a `SurveyClient` talks to.
pub struct SurveyDependencies {
    pub store: Arc<dyn DocumentStore>,
    pub ip_lookup: Arc<dyn IpLookup>,
    pub geo_locator: Arc<dyn GeoLocator>,
    pub mailer: Arc<dyn Mailer>,
    pub analytics: Arc<dyn Analytics>,
    pub catalog: ImageCatalog,
    pub links: ResumeLinks,
    pub screen_size: Option<ScreenSize>,
}

/// Drives one participant's session: feeds input to the step controller and
/// writes the snapshots it produces.
pub struct SurveyClient {
    controller: StepController,
    gateway: PersistenceGateway,
    mailer: Arc<dyn Mailer>,
    analytics: Arc<dyn Analytics>,
    catalog: ImageCatalog,
    links: ResumeLinks,
    screen_size: Option<ScreenSize>,
    clock: Clock,
    pending: Vec<JoinHandle<()>>,
}

impl SurveyClient {
    pub fn new(deps: SurveyDependencies) -> Self {
        let gateway = PersistenceGateway::new(deps.store, deps.ip_lookup, deps.geo_locator);
        Self {
            controller: fresh_controller(deps.screen_size, Utc::now),
            gateway,
            mailer: deps.mailer,
            analytics: deps.analytics,
            catalog: deps.catalog,
            links: deps.links,
            screen_size: deps.screen_size,
            clock: Utc::now,
            pending: Vec::new(),
        }
    }

    /// Replaces the wall clock used for start times, durations and exit
    /// timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.controller = self.controller.with_clock(clock);
        self
    }

    pub fn controller(&self) -> &StepController {
        &self.controller
    }

    pub fn screen(&self) -> Screen {
        self.controller.screen()
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    /// Opens the survey, resuming from a stored record when an id is given.
    /// An id that matches nothing starts a fresh session on the welcome
    /// screen.
    pub async fn load(&mut self, resume_id: Option<DocumentId>) -> Result<(), SurveyError> {
        self.track(AnalyticsEvent::PageView {
            page_title: PAGE_TITLE.to_string(),
            page_location: self.links.base().to_string(),
        })
        .await;

        let Some(id) = resume_id else {
            self.controller = fresh_controller(self.screen_size, self.clock);
            return Ok(());
        };

        match self.gateway.fetch(&id).await? {
            Some(record) => {
                self.controller =
                    StepController::resume(record, self.screen_size, (self.clock)())
                        .with_clock(self.clock);
                let session = self.controller.session();
                info!(
                    document_id = %id,
                    session_id = %session.session_id,
                    step = %self.controller.current_step(),
                    "resumed survey session"
                );
            }
            None => {
                warn!(document_id = %id, "no stored record for resumption link; starting fresh");
                self.controller = fresh_controller(self.screen_size, self.clock);
            }
        }
        Ok(())
    }

    pub async fn start(&mut self) {
        self.controller.start((self.clock)());
        let session = self.controller.session().clone();
        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            "survey started"
        );
        self.track(AnalyticsEvent::SurveyStart {
            session_id: session.session_id,
            user_id: session.user_id,
        })
        .await;
    }

    pub fn next_step(&mut self) -> Transition {
        let transition = self.controller.next_step();
        if let Transition::Advanced(record) = &transition {
            self.spawn_write(record.as_ref().clone());
        }
        transition
    }

    pub fn previous_step(&mut self) {
        self.controller.previous_step();
    }

    pub fn edit(&mut self, edit: AnswerEdit) -> Result<(), SurveyError> {
        Ok(self.controller.edit(edit)?)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.controller.set_name(name.into());
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.controller.set_email(email.into());
    }

    pub fn set_mobility_aid_options(&mut self, options: Vec<String>) {
        self.controller.set_mobility_aid_options(options);
    }

    pub fn choose_mobility_aid(&mut self, aid: impl Into<String>) -> Result<(), SurveyError> {
        self.edit(AnswerEdit::MobilityAid(aid.into()))
    }

    pub fn set_sidewalk_barriers(&mut self, text: impl Into<String>) {
        self.controller.set_sidewalk_barriers(text.into());
    }

    pub fn set_ranking(&mut self, order: Vec<String>) {
        self.controller.set_ranking(order);
    }

    /// Images the current screen asks the participant to choose from.
    pub fn offered_images(&self) -> Vec<ImageId> {
        match self.controller.screen() {
            Screen::ImageSelection { group, .. } => self
                .catalog
                .pool_for(group, self.controller.layout().plan().image_seed),
            Screen::ImageComparison { group, side, .. } => self
                .controller
                .image_selections()
                .images(group, side)
                .to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn complete_selection(
        &mut self,
        group_a: Vec<ImageId>,
        group_b: Vec<ImageId>,
    ) -> Result<(), SurveyError> {
        if let Screen::ImageSelection { group, .. } = self.controller.screen() {
            if let Some(image) = group_a
                .iter()
                .chain(&group_b)
                .find(|image| !self.catalog.contains(group, image))
            {
                return Err(ControllerError::ForeignImage {
                    group,
                    image: image.clone(),
                }
                .into());
            }
        }

        let record = self.controller.complete_selection(group_a, group_b)?;
        self.spawn_write(record);
        Ok(())
    }

    pub fn complete_comparison(&mut self, preferred: ImageId) -> Result<(), SurveyError> {
        let record = self.controller.complete_comparison(preferred, (self.clock)())?;
        self.spawn_write(record);
        Ok(())
    }

    pub fn dismiss_break_overlay(&mut self) {
        self.controller.dismiss_break_overlay();
    }

    /// Break-overlay "continue later": stores progress and returns a link
    /// that resumes at the first unfinished image block.
    pub async fn save_for_later(&mut self) -> Result<Url, SurveyError> {
        let record = self.controller.save_for_later_snapshot();
        let id = self.gateway.write(record).await?;
        let url = self.links.resume_url(&id)?;
        info!(document_id = %id, "saved survey for later");
        self.controller.set_continue_url(url.to_string());
        Ok(url)
    }

    /// Closes the current aid and starts the next one straight away.
    pub async fn continue_with_aid(
        &mut self,
        next_aid: impl Into<String>,
    ) -> Result<DocumentId, SurveyError> {
        let mut next = self.controller.clone();
        let record = next.conclude_aid(&BranchChoice::ContinueNow {
            next_aid: next_aid.into(),
        })?;
        let id = self.gateway.write(record).await?;
        self.controller = next;
        Ok(id)
    }

    /// Closes the current aid and issues a link to evaluate the rest later.
    pub async fn continue_later(&mut self) -> Result<Url, SurveyError> {
        let mut next = self.controller.clone();
        let completed = next.conclude_aid(&BranchChoice::ContinueLater)?;
        self.gateway.write(completed).await?;

        let id = self.gateway.write(next.snapshot(LogType::Continue)).await?;
        let url = self.links.resume_url(&id)?;
        info!(document_id = %id, "issued resumption link");
        next.enter_ending(Some(url.to_string()));
        self.controller = next;
        Ok(url)
    }

    pub async fn submit(&mut self) -> Result<DocumentId, SurveyError> {
        let record = self.controller.final_snapshot()?;
        let duration = record.duration;
        let id = self.gateway.write(record).await?;

        let session = self.controller.session().clone();
        info!(document_id = %id, session_id = %session.session_id, duration, "survey submitted");
        self.track(AnalyticsEvent::SurveyComplete {
            session_id: session.session_id,
            user_id: session.user_id,
            duration,
        })
        .await;
        Ok(id)
    }

    pub async fn email_resume_link(&self) -> Result<(), SurveyError> {
        let answers = self.controller.answers();
        let link = match self.controller.continue_url() {
            Some(link) if !answers.email.is_empty() => link,
            _ => {
                error!("email or resumption link is missing; nothing sent");
                return Err(SurveyError::MissingResumeLink);
            }
        };

        let to_name = if answers.name.trim().is_empty() {
            DEFAULT_RECIPIENT_NAME.to_string()
        } else {
            answers.name.clone()
        };
        let request = EmailRequest {
            to_email: answers.email.clone(),
            continuation_link: link.to_string(),
            from_name: EMAIL_FROM_NAME.to_string(),
            to_name,
        };

        self.mailer.send(&request).await.map_err(|source| {
            error!(error = %source, to = %request.to_email, "failed to send resumption email");
            SurveyError::Email { source }
        })?;
        info!(to = %request.to_email, "resumption email sent");
        Ok(())
    }

    /// Best-effort notice that the participant left.
    pub async fn exit_beacon(&self) {
        self.track(AnalyticsEvent::SurveyExit {
            step: self.controller.current_step(),
            timestamp: (self.clock)(),
        })
        .await;
    }

    /// Waits for every progress write still in flight.
    pub async fn flush(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "progress write task did not finish");
            }
        }
    }

    fn spawn_write(&mut self, record: LogRecord) {
        self.pending.retain(|handle| !handle.is_finished());
        self.pending.push(self.gateway.spawn_write(record));
    }

    async fn track(&self, event: AnalyticsEvent) {
        if let Err(err) = self.analytics.track(&event).await {
            warn!(error = %err, event = event.name(), "analytics event not delivered");
        }
    }
}

fn fresh_controller(screen_size: Option<ScreenSize>, clock: Clock) -> StepController {
    StepController::new(
        SessionInfo::fresh(screen_size),
        layout::shuffled_plan(&mut thread_rng()),
    )
    .with_clock(clock)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
