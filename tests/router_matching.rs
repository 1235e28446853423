// Route lookup through the public Router API: static-first matching, method dispatch,
// rebinding and parameter-name conflicts
#[cfg(test)]
mod test {
    use std::sync::Arc;

    use http::Method;
    use keel::{
        KernelError,
        core::{
            Route,
            resolvers::ResolverChain,
            router::Router,
            security::{AnonymousAuthenticator, GuardAuthorizer},
        },
    };

    fn router() -> Router {
        Router::new(
            ResolverChain::with_defaults(),
            Arc::new(AnonymousAuthenticator),
            Arc::new(GuardAuthorizer),
        )
    }

    fn member(router: &Router, method: Method, path: &str) -> Option<String> {
        router
            .find(&method, path)
            .map(|route| route.member.clone())
    }

    #[test]
    fn test_static_segment_wins_over_parameter() {
        let mut router = router();
        router
            .register("/api/dogs/:id", Method::GET, Route::new("dogs", "get"))
            .unwrap();
        router
            .register("/api/dogs/search", Method::GET, Route::new("dogs", "search"))
            .unwrap();

        assert_eq!(
            member(&router, Method::GET, "/api/dogs/search"),
            Some("search".to_string())
        );
        assert_eq!(
            member(&router, Method::GET, "/api/dogs/42"),
            Some("get".to_string())
        );
        assert_eq!(member(&router, Method::GET, "/api/dogs"), None);
    }

    #[test]
    fn test_static_match_is_final() {
        let mut router = router();
        router
            .register("/a/b/c", Method::GET, Route::new("letters", "abc"))
            .unwrap();
        router
            .register("/a/:x/d", Method::GET, Route::new("letters", "axd"))
            .unwrap();

        // `b` commits to the static branch, which has no `d` child.
        assert_eq!(member(&router, Method::GET, "/a/b/d"), None);
        assert_eq!(
            member(&router, Method::GET, "/a/z/d"),
            Some("axd".to_string())
        );
    }

    #[test]
    fn test_method_dispatch_on_one_path() {
        let mut router = router();
        router
            .register("/dogs/:id", Method::GET, Route::new("dogs", "get"))
            .unwrap();
        router
            .register("/dogs/:id", Method::DELETE, Route::new("dogs", "delete"))
            .unwrap();

        assert_eq!(router.route_count(), 2);
        assert_eq!(
            member(&router, Method::DELETE, "/dogs/1"),
            Some("delete".to_string())
        );
        assert_eq!(member(&router, Method::PUT, "/dogs/1"), None);
    }

    #[test]
    fn test_rebinding_replaces_previous_route() {
        let mut router = router();
        router
            .register("/dogs", Method::GET, Route::new("dogs", "first"))
            .unwrap();
        router
            .register("/dogs/", Method::GET, Route::new("dogs", "second"))
            .unwrap();

        assert_eq!(router.route_count(), 1);
        assert_eq!(
            member(&router, Method::GET, "/dogs"),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_conflicting_parameter_names_are_rejected() {
        let mut router = router();
        router
            .register("/dogs/:id", Method::GET, Route::new("dogs", "get"))
            .unwrap();

        let error = router
            .register("/dogs/:name/owner", Method::GET, Route::new("dogs", "owner"))
            .unwrap_err();
        assert!(matches!(error, KernelError::RouteConflict(_)));
    }
}
