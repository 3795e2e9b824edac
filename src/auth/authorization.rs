//! The final allow/deny decision for a request.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::auth::BoxFuture;
use crate::auth::context::{Grant, RouteRequirements};
use crate::auth::deadline::within;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::models::Consumer;
use crate::auth::scope::match_scopes;

/// Checks a consumer's permission against what a route declares.
pub trait PermissionChecker: Send + Sync {
    fn check<'a>(
        &'a self,
        consumer: &'a Consumer,
        route: &'a RouteRequirements,
    ) -> BoxFuture<'a, AuthResult<()>>;
}

/// Permission checker driven by the linked user's ring and resource grants.
///
/// - admins pass everything
/// - routes without a resource have nothing to check
/// - maintainers may read any resource
/// - otherwise the user needs a grant on the resource at or above the level
#[derive(Debug, Clone, Copy, Default)]
pub struct RingPermissionChecker;

impl RingPermissionChecker {
    fn decide(consumer: &Consumer, route: &RouteRequirements) -> AuthResult<()> {
        if consumer.is_admin() {
            return Ok(());
        }
        let Some(resource) = &route.resource else {
            return Ok(());
        };
        if consumer.is_maintainer() && !route.permission.is_mutating() {
            return Ok(());
        }

        let granted = consumer.user.as_ref().and_then(|u| u.level_on(resource));
        match granted {
            Some(level) if level >= route.permission => Ok(()),
            _ => Err(AuthError::PermissionDenied {
                required: route.permission,
                resource: Some(resource.clone()),
            }),
        }
    }
}

impl PermissionChecker for RingPermissionChecker {
    fn check<'a>(
        &'a self,
        consumer: &'a Consumer,
        route: &'a RouteRequirements,
    ) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(async move { Self::decide(consumer, route) })
    }
}

/// Renders the decision once the identity stages have run.
pub struct AuthorizationEngine {
    permissions: Arc<dyn PermissionChecker>,
}

impl AuthorizationEngine {
    pub fn new(permissions: Arc<dyn PermissionChecker>) -> Self {
        Self { permissions }
    }

    pub async fn authorize(
        &self,
        static_granted: bool,
        consumer: Option<&Consumer>,
        route: &RouteRequirements,
        deadline: Instant,
    ) -> AuthResult<Grant> {
        if static_granted {
            return Ok(Grant::StaticToken);
        }

        if let Some(consumer) = consumer {
            if !route.scopes.is_empty() {
                match_scopes(&consumer.scopes, &route.scopes).map_err(|denial| {
                    warn!(consumer_id = %consumer.id, %denial, "scope check rejected request");
                    AuthError::ScopeMismatch(denial)
                })?;
            }

            within(
                deadline,
                "permission_check",
                self.permissions.check(consumer, route),
            )
            .await?
            .inspect_err(|e| warn!(consumer_id = %consumer.id, "permission check failed: {}", e))?;
        }

        if route.need_auth && consumer.is_none() {
            debug!("route requires authentication and no consumer was resolved");
            return Err(AuthError::Unauthenticated);
        }

        if route.need_admin && !consumer.is_some_and(Consumer::is_admin) {
            warn!(
                consumer_id = consumer.map(|c| c.id.as_str()).unwrap_or("-"),
                "admin route refused to non-admin consumer"
            );
            return Err(AuthError::AdminRequired);
        }

        Ok(match consumer {
            Some(_) => Grant::Session,
            None => Grant::Anonymous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::PermissionLevel;
    use crate::auth::models::{AuthenticatedUser, Ring};
    use crate::types::ConsumerId;
    use std::time::Duration;

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new(Arc::new(RingPermissionChecker))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn consumer(ring: Ring) -> Consumer {
        Consumer::new(ConsumerId::new("c1"), "alice").with_user(AuthenticatedUser::new("alice", ring))
    }

    #[tokio::test]
    async fn test_static_grant_bypasses_everything() {
        let route = RouteRequirements::admin().with_scopes(["x"]);
        let grant = engine().authorize(true, None, &route, deadline()).await.unwrap();
        assert_eq!(grant, Grant::StaticToken);
    }

    #[tokio::test]
    async fn test_anonymous_on_public_route() {
        let grant = engine()
            .authorize(false, None, &RouteRequirements::public(), deadline())
            .await
            .unwrap();
        assert_eq!(grant, Grant::Anonymous);
    }

    #[tokio::test]
    async fn test_need_auth_without_consumer() {
        let err = engine()
            .authorize(false, None, &RouteRequirements::authenticated(), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_scope_mismatch_is_unauthorized() {
        let c = consumer(Ring::User).with_scopes(["build:read"]);
        let route = RouteRequirements::authenticated().with_scopes(["build:write"]);
        let err = engine().authorize(false, Some(&c), &route, deadline()).await.unwrap_err();
        match err {
            AuthError::ScopeMismatch(denial) => {
                assert!(denial.granted.contains("build:read"));
                assert!(denial.required.contains("build:write"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_admin_on_admin_route_is_forbidden() {
        let c = consumer(Ring::User);
        let err = engine()
            .authorize(false, Some(&c), &RouteRequirements::admin(), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AdminRequired));
        assert_eq!(err.kind(), crate::auth::DenialKind::Forbidden);

        let admin = consumer(Ring::Admin);
        let grant = engine()
            .authorize(false, Some(&admin), &RouteRequirements::admin(), deadline())
            .await
            .unwrap();
        assert_eq!(grant, Grant::Session);
    }

    #[tokio::test]
    async fn test_resource_permissions() {
        let route = RouteRequirements::authenticated()
            .with_permission(PermissionLevel::Write)
            .with_resource("project/ABC");

        let reader = Consumer::new(ConsumerId::new("c1"), "r").with_user(
            AuthenticatedUser::new("r", Ring::User).with_grant("project/ABC", PermissionLevel::Read),
        );
        let err = engine().authorize(false, Some(&reader), &route, deadline()).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::PermissionDenied { required: PermissionLevel::Write, .. }
        ));

        let writer = Consumer::new(ConsumerId::new("c2"), "w").with_user(
            AuthenticatedUser::new("w", Ring::User).with_grant("project/ABC", PermissionLevel::Write),
        );
        assert!(engine().authorize(false, Some(&writer), &route, deadline()).await.is_ok());
    }

    #[tokio::test]
    async fn test_maintainer_reads_any_resource() {
        let c = consumer(Ring::Maintainer);
        let read = RouteRequirements::authenticated().with_resource("project/ABC");
        assert!(engine().authorize(false, Some(&c), &read, deadline()).await.is_ok());

        let write = read.clone().with_permission(PermissionLevel::Write);
        assert!(engine().authorize(false, Some(&c), &write, deadline()).await.is_err());
    }

    #[tokio::test]
    async fn test_consumer_without_user_on_resource_route() {
        let c = Consumer::new(ConsumerId::new("c1"), "bot");
        let route = RouteRequirements::authenticated().with_resource("project/ABC");
        let err = engine().authorize(false, Some(&c), &route, deadline()).await.unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));
    }
}
