//! Infra existence guarantor
//!
//! Makes sure the local infra repository exists with at least one commit,
//! and that it tracks its upstream when a driver owns one. When the owning
//! driver reports the remote repository already exists, the local repository
//! is rebuilt from it.

use tracing::{debug, info, warn};

use crate::create::Orchestrator;
use crate::error::{ForgeError, ForgeResult, Outcome};
use crate::git_manager::InfraRepo;
use crate::state_machine::{InfraState, InfraStateMachine};

impl<R: InfraRepo> Orchestrator<R> {
    /// Ensure the infra repository exists.
    ///
    /// Returns [`Outcome::Conflict`] when the workspace was rebuilt from an
    /// existing upstream; callers treat it as a warning.
    pub async fn ensure_infra_exists(&mut self) -> ForgeResult<Outcome> {
        let mut sm = InfraStateMachine::new();
        let result = self.ensure_infra_steps(&mut sm).await;
        if let Err(e) = &result {
            if !sm.is_terminal() {
                sm.fail(&e.to_string())?;
            }
        }
        debug!(summary = %sm.summary(), "Infra existence check finished");
        result
    }

    async fn ensure_infra_steps(&mut self, sm: &mut InfraStateMachine) -> ForgeResult<Outcome> {
        self.repo.ensure_initialized()?;

        let Some(owner) = self.session.drivers.infra_owner_name() else {
            sm.advance(InfraState::NoUpstreamOwner, None)?;
            if !self.session.upstream_disabled() {
                return Err(ForgeError::MissingUpstream {
                    infra: self.session.infra_name().to_string(),
                });
            }
            self.repo.ensure_synced(None, &self.session.infra_readme)?;
            sm.advance(InfraState::Ready, Some("local only"))?;
            return Ok(Outcome::Done);
        };

        sm.advance(InfraState::UpstreamOwnerPresent, Some(owner.as_str()))?;
        match self.do_driver_create(&owner).await? {
            Outcome::Done => {
                sm.advance(InfraState::Ready, None)?;
                Ok(Outcome::Done)
            }
            Outcome::Conflict(conflict) => {
                sm.advance(InfraState::Restore, Some(conflict.message.as_str()))?;
                self.restore_infra_repo()?;
                sm.advance(InfraState::Ready, Some("restored"))?;
                Ok(Outcome::Conflict(conflict))
            }
        }
    }

    /// Rebuild the local infra repository from the upstream described in the
    /// owner's conflict result.
    fn restore_infra_repo(&mut self) -> ForgeResult<()> {
        let infra = self.session.infra_name().to_string();
        let owner = self
            .session
            .drivers
            .infra_owner()
            .ok_or_else(|| ForgeError::restore(&infra, "No driver owns the infra repository."))?;

        let repo = owner
            .result
            .as_ref()
            .and_then(|r| r.repo(&infra))
            .ok_or_else(|| ForgeError::restore(&infra, "Not found."))?;
        if !repo.exist {
            return Err(ForgeError::restore(&infra, "Inexistent."));
        }
        if repo.upstream.is_empty() {
            return Err(ForgeError::restore(&infra, "No upstream URL returned."));
        }
        let upstream = repo.upstream.clone();

        warn!(repo = %infra, upstream = %upstream, "Infra repository already exists upstream, restoring workspace");
        self.session.set_infra_upstream(upstream.clone());
        self.repo
            .ensure_synced(Some(&upstream), &self.session.infra_readme)?;

        info!(
            "Note: As your workspace was empty, it has been rebuilt from '{upstream}'. \
             Use create to add new application sources."
        );
        Ok(())
    }
}
