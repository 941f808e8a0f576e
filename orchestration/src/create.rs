//! Create orchestration
//!
//! `Orchestrator::create` bootstraps an organization: resolve the infra
//! upstream, make sure the infra repository exists, then run the create
//! pipeline of every other driver. Driver services and the workspace record
//! are released on every exit path.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::error::{ForgeError, ForgeResult, Outcome};
use crate::git_manager::InfraRepo;
use crate::lifecycle;
use crate::session::Session;
use crate::upstream;

/// Cleanup registered during a run, executed in reverse order on exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// Persist the workspace record
    SaveWorkspace,
    /// Stop the named driver's service
    StopDriver(String),
}

/// Drives driver actions and the infra repository for one session.
pub struct Orchestrator<R: InfraRepo> {
    pub(crate) session: Session,
    pub(crate) repo: R,
}

impl<R: InfraRepo> Orchestrator<R> {
    pub fn new(session: Session, repo: R) -> Self {
        Self { session, repo }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Bootstrap the organization.
    pub async fn create(&mut self) -> ForgeResult<()> {
        upstream::define_infra_upstream(&mut self.session, "create")?;
        debug!(
            instance = %self.session.workspace.instance,
            "Infra upstream selected"
        );

        let mut releases = vec![Release::SaveWorkspace];
        releases.extend(self.session.drivers.names().into_iter().map(Release::StopDriver));

        let result = self.create_all().await;
        let saved = self.release(releases).await;

        match (result, saved) {
            (Ok(()), saved) => saved,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(save)) => {
                error!(error = %save, "Unable to save the workspace record");
                Err(e)
            }
        }
    }

    async fn create_all(&mut self) -> ForgeResult<()> {
        self.session.workspace.ensure_exists()?;

        match self.ensure_infra_exists().await {
            Ok(Outcome::Done) => {}
            Ok(Outcome::Conflict(conflict)) => warn!("Warning. {conflict}"),
            Err(e) => return Err(ForgeError::InfraCheck { source: Box::new(e) }),
        }

        let owner = self.session.drivers.infra_owner_name();
        for instance in self.session.drivers.names() {
            if owner.as_deref() == Some(instance.as_str()) {
                continue;
            }
            match self.do_driver_create(&instance).await {
                Ok(Outcome::Done) => {}
                Ok(Outcome::Conflict(conflict)) => warn!("Warning. {conflict}"),
                Err(e) => {
                    return Err(ForgeError::DriverCreate {
                        instance,
                        source: Box::new(e),
                    })
                }
            }
        }

        info!(organization = %self.session.organization, "create {} DONE", self.session.organization);
        Ok(())
    }

    /// Run registered releases, last registered first. Stop failures are
    /// logged; a save failure is returned.
    async fn release(&mut self, mut releases: Vec<Release>) -> ForgeResult<()> {
        let mut saved = Ok(());
        while let Some(release) = releases.pop() {
            match release {
                Release::StopDriver(name) => {
                    let Some(driver) = self.session.drivers.get_mut(&name) else {
                        continue;
                    };
                    if let Err(e) = lifecycle::stop(driver).await {
                        warn!(driver = %name, error = %e, "Unable to stop driver service");
                    }
                }
                Release::SaveWorkspace => {
                    saved = self.session.workspace.save();
                }
            }
        }
        saved
    }

    /// Create pipeline of one driver instance.
    ///
    /// Runs `create`, records the infra upstream if the driver owns it, then
    /// commits the generated files, pushes when an upstream is known and
    /// runs `maintain`. A conflict stops the pipeline before any git change.
    pub async fn do_driver_create(&mut self, instance: &str) -> ForgeResult<Outcome> {
        let outcome = self.driver_do(instance, "create").await?;
        if outcome.is_conflict() {
            return Ok(outcome);
        }

        let driver = self
            .session
            .drivers
            .get(instance)
            .ok_or_else(|| ForgeError::UnknownDriverInstance {
                instance: instance.to_string(),
            })?;

        if driver.infra_owner && self.session.infra_upstream.is_none() {
            let infra = self.session.infra_name().to_string();
            let url = driver
                .result
                .as_ref()
                .and_then(|r| r.repo(&infra))
                .map(|repo| repo.upstream.clone())
                .filter(|url| !url.is_empty())
                .ok_or_else(|| ForgeError::ResultInconsistency {
                    repo: infra.clone(),
                    driver: instance.to_string(),
                })?;
            debug!(repo = %infra, upstream = %url, "Infra upstream reported by its driver");
            self.session.set_infra_upstream(url);
        }

        let driver = self
            .session
            .drivers
            .get(instance)
            .ok_or_else(|| ForgeError::UnknownDriverInstance {
                instance: instance.to_string(),
            })?;
        let files = self.generated_files(instance);
        let message = commit_message(driver, "create");

        self.repo
            .ensure_synced(self.session.infra_upstream.as_deref(), &self.session.infra_readme)?;
        self.repo.stage(&files)?;
        let commit = self.repo.commit(&message)?;
        info!(driver = instance, commit = %commit, "Driver source files committed");

        if self.session.infra_upstream.is_some() {
            self.repo.push()?;
            info!(driver = instance, "Infra repository pushed");
        }

        self.do_driver_maintain(instance).await?;
        Ok(Outcome::Done)
    }

    /// Run `maintain` on one driver instance.
    pub async fn do_driver_maintain(&mut self, instance: &str) -> ForgeResult<()> {
        if let Outcome::Conflict(conflict) = self.driver_do(instance, "maintain").await? {
            warn!("Warning. {conflict}");
        }
        Ok(())
    }

    pub(crate) async fn driver_do(&mut self, instance: &str, action: &str) -> ForgeResult<Outcome> {
        let Session {
            drivers,
            workspace,
            driver_options,
            ..
        } = &mut self.session;
        let driver = drivers
            .get_mut(instance)
            .ok_or_else(|| ForgeError::UnknownDriverInstance {
                instance: instance.to_string(),
            })?;
        lifecycle::run_action(driver, workspace, driver_options, action).await
    }

    /// Repository-relative paths of the files the driver listed in its result.
    /// Anything else under the shared category directory stays untracked.
    fn generated_files(&self, instance: &str) -> Vec<PathBuf> {
        let Some(driver) = self.session.drivers.get(instance) else {
            return Vec::new();
        };
        let base = PathBuf::from("apps").join(driver.category.as_str());
        driver
            .result
            .as_ref()
            .map(|r| r.data.files.iter().map(|file| base.join(file)).collect())
            .unwrap_or_default()
    }
}

fn commit_message(driver: &crate::driver::Driver, action: &str) -> String {
    let mut message = format!("{}({}) {action}", driver.name, driver.driver);
    let options = driver
        .result
        .as_ref()
        .map(|r| &r.data.options)
        .filter(|options| !options.is_empty());
    if let Some(options) = options {
        message.push_str("\n\nDriver options:");
        for (key, value) in options {
            message.push_str(&format!("\n  {key}: {value}"));
        }
    }
    message
}
