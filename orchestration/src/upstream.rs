//! Upstream resolver
//!
//! Decides which driver instance owns the infra repository remote.
//! Reads `requested_upstream` and the registry; writes `workspace.instance`,
//! `workspace.driver` and the `infra_owner` flag of at most one driver.

use tracing::{debug, warn};

use crate::driver::NO_UPSTREAM;
use crate::error::{ForgeError, ForgeResult};
use crate::session::Session;
use crate::workspace::ResolvedUpstream;

/// Resolve the infra upstream instance for `action` and flag its driver.
pub fn define_infra_upstream(session: &mut Session, action: &str) -> ForgeResult<()> {
    if session.workspace.instance.is_resolved() {
        return attach_loaded_owner(session);
    }

    let requested = session.requested_upstream.clone();
    if requested.as_deref() == Some(NO_UPSTREAM) {
        debug!(action, "No upstream instance configured as requested by --infra-upstream none");
        session.workspace.instance = ResolvedUpstream::Disabled;
        return Ok(());
    }

    let resolved = match requested.as_deref() {
        Some(name) if session.drivers.contains(name) => name.to_string(),
        _ => {
            let upstreams: Vec<String> = session
                .drivers
                .upstreams()
                .iter()
                .map(|d| d.name.clone())
                .collect();
            if let Some(name) = requested.as_deref() {
                warn!(action, requested = name, "Requested infra upstream is not a declared instance");
            }
            match upstreams.as_slice() {
                [] => {
                    debug!(action, "No upstream driver declared, infra upstream left unresolved");
                    return Ok(());
                }
                [only] => {
                    debug!(
                        action,
                        instance = %only,
                        repo = session.infra_name(),
                        "Selected by default as upstream instance for the infra repository"
                    );
                    only.clone()
                }
                _ => return Err(ForgeError::AmbiguousUpstream { candidates: upstreams }),
            }
        }
    };

    let driver = session
        .drivers
        .get_mut(&resolved)
        .ok_or_else(|| ForgeError::UnknownDriverInstance {
            instance: resolved.clone(),
        })?;
    driver.infra_owner = true;
    session.workspace.driver = driver.driver.clone();
    session.workspace.instance = ResolvedUpstream::Instance(resolved);
    Ok(())
}

/// A previous run already resolved the instance: re-flag its driver unless
/// something owns the infra repository already. The recorded instance must be
/// declared again.
fn attach_loaded_owner(session: &mut Session) -> ForgeResult<()> {
    let Some(name) = session.workspace.instance.instance().map(str::to_string) else {
        return Ok(());
    };
    if session.drivers.infra_owner().is_some() {
        return Ok(());
    }
    let driver = session
        .drivers
        .get_mut(&name)
        .ok_or_else(|| ForgeError::UnknownDriverInstance {
            instance: name.clone(),
        })?;
    debug!(instance = %name, "Infra upstream loaded from workspace");
    driver.infra_owner = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AppSpec, Driver, DriverRegistry};
    use crate::plugin::MockPluginService;
    use crate::workspace::Workspace;

    fn session(apps: &[&str], requested: Option<&str>) -> Session {
        let mut registry = DriverRegistry::new();
        for app in apps {
            registry
                .register(Driver::new(
                    &AppSpec::parse(app).unwrap(),
                    Box::new(MockPluginService::new()),
                ))
                .unwrap();
        }
        let mut ws = Workspace::new("/work/acme");
        ws.infra.name = "acme-infra".into();
        Session::new(ws, registry).with_requested_upstream(requested.map(String::from))
    }

    fn owners(session: &Session) -> Vec<String> {
        session
            .drivers
            .iter()
            .filter(|d| d.infra_owner)
            .map(|d| d.name.clone())
            .collect()
    }

    #[test]
    fn test_single_upstream_selected_by_default() {
        let mut s = session(&["upstream:github", "ci:jenkins"], None);
        define_infra_upstream(&mut s, "create").unwrap();

        assert_eq!(s.workspace.instance, ResolvedUpstream::Instance("github".into()));
        assert_eq!(s.workspace.driver, "github");
        assert_eq!(owners(&s), vec!["github"]);
    }

    #[test]
    fn test_multiple_upstreams_are_ambiguous() {
        let mut s = session(&["upstream:github", "upstream:gitlab"], None);
        let err = define_infra_upstream(&mut s, "create").unwrap_err();

        match err {
            ForgeError::AmbiguousUpstream { candidates } => {
                assert_eq!(candidates, vec!["github", "gitlab"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(owners(&s).is_empty());
        assert!(!s.workspace.instance.is_resolved());
    }

    #[test]
    fn test_explicit_selection_among_several() {
        let mut s = session(
            &["upstream:github", "upstream:gitlab:internal"],
            Some("internal"),
        );
        define_infra_upstream(&mut s, "create").unwrap();

        assert_eq!(s.workspace.instance, ResolvedUpstream::Instance("internal".into()));
        assert_eq!(s.workspace.driver, "gitlab");
        assert_eq!(owners(&s), vec!["internal"]);
    }

    #[test]
    fn test_none_disables_upstream() {
        let mut s = session(&["upstream:github"], Some("none"));
        define_infra_upstream(&mut s, "create").unwrap();

        assert_eq!(s.workspace.instance, ResolvedUpstream::Disabled);
        assert!(owners(&s).is_empty());
    }

    #[test]
    fn test_no_upstream_driver_leaves_unresolved() {
        let mut s = session(&["ci:jenkins"], None);
        define_infra_upstream(&mut s, "create").unwrap();

        assert_eq!(s.workspace.instance, ResolvedUpstream::Unresolved);
        assert!(owners(&s).is_empty());
    }

    #[test]
    fn test_second_invocation_mutates_nothing() {
        let mut s = session(&["upstream:github", "ci:jenkins"], None);
        define_infra_upstream(&mut s, "create").unwrap();

        // Change the selector: an already resolved session must ignore it.
        s.requested_upstream = Some("jenkins".into());
        define_infra_upstream(&mut s, "create").unwrap();

        assert_eq!(s.workspace.instance, ResolvedUpstream::Instance("github".into()));
        assert_eq!(owners(&s), vec!["github"]);
    }

    #[test]
    fn test_loaded_instance_reattaches_owner() {
        let mut s = session(&["upstream:github", "upstream:gitlab"], None);
        s.workspace.instance = ResolvedUpstream::Instance("gitlab".into());

        // Two upstreams would be ambiguous, but the workspace already decided.
        define_infra_upstream(&mut s, "create").unwrap();
        assert_eq!(owners(&s), vec!["gitlab"]);
    }

    #[test]
    fn test_loaded_instance_must_be_declared() {
        let mut s = session(&["ci:jenkins"], None);
        s.workspace.instance = ResolvedUpstream::Instance("github".into());

        let err = define_infra_upstream(&mut s, "create").unwrap_err();
        match &err {
            ForgeError::UnknownDriverInstance { instance } => assert_eq!(instance, "github"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.recovery_suggestion().is_some());
        assert!(owners(&s).is_empty());
    }
}
