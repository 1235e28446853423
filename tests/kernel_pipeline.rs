// End-to-end request handling through Kernel::handle_request: interceptor chains,
// authentication and guards, error conversion and response normalization
#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use http::{Method, StatusCode};
    use keel::{
        ArgumentDescriptor, ControllerDefinition, HandlerController, HttpError, Identity, Kernel,
        KernelError, KernelResult, Module, Provider, Request, Response, RouteDefinition, Scope,
        core::RouteMetadata,
        ports::{
            Authenticator, ErrorResponseInterceptor, Guard, RequestInterceptor,
            ResponseInterceptor,
        },
    };
    use serde_json::{Value, json};

    const TRAIL_HEADER: &str = "x-trail";
    const RESPONSE_TRAIL_HEADER: &str = "x-response-trail";

    fn append(existing: Option<&str>, name: &str) -> String {
        match existing {
            Some(existing) => format!("{existing},{name}"),
            None => name.to_string(),
        }
    }

    /// Appends its name to the request trail it received.
    struct Trail(&'static str);

    #[async_trait]
    impl RequestInterceptor for Trail {
        fn name(&self) -> &str {
            self.0
        }

        async fn intercept_request(&self, request: Request) -> KernelResult<Request> {
            let trail = append(request.header(TRAIL_HEADER), self.0);
            let mut request = request;
            request.headers.remove(TRAIL_HEADER);
            Ok(request.with_header(TRAIL_HEADER, &trail))
        }
    }

    #[async_trait]
    impl ResponseInterceptor for Trail {
        fn name(&self) -> &str {
            self.0
        }

        async fn intercept_response(
            &self,
            response: Response,
            request: &Request,
        ) -> KernelResult<Response> {
            let trail = append(response.header(RESPONSE_TRAIL_HEADER), self.0);
            let response = response.with_header(RESPONSE_TRAIL_HEADER, &trail);
            match request.header(TRAIL_HEADER) {
                Some(request_trail) => Ok(response.with_header(TRAIL_HEADER, request_trail)),
                None => Ok(response),
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl RequestInterceptor for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn intercept_request(&self, _request: Request) -> KernelResult<Request> {
            Err(KernelError::Other(eyre::eyre!("interceptor exploded")))
        }
    }

    #[async_trait]
    impl ResponseInterceptor for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn intercept_response(
            &self,
            _response: Response,
            _request: &Request,
        ) -> KernelResult<Response> {
            Err(KernelError::Other(eyre::eyre!("serializer exploded")))
        }
    }

    #[async_trait]
    impl ErrorResponseInterceptor for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn intercept_error(
            &self,
            _error: &KernelError,
            _request: &Request,
            _response: Response,
        ) -> KernelResult<Response> {
            Err(KernelError::Other(eyre::eyre!("formatter exploded")))
        }
    }

    /// Wraps every error body together with the path that failed.
    struct Envelope;

    #[async_trait]
    impl ErrorResponseInterceptor for Envelope {
        async fn intercept_error(
            &self,
            error: &KernelError,
            request: &Request,
            response: Response,
        ) -> KernelResult<Response> {
            let body = json!({
                "error": response.body,
                "path": request.path(),
                "kind": error.kind(),
            });
            Ok(response.with_body(body))
        }
    }

    /// `x-user: <id>` identifies the caller.
    struct HeaderAuthenticator;

    #[async_trait]
    impl Authenticator for HeaderAuthenticator {
        async fn authenticate(
            &self,
            request: &Request,
            _metadata: &RouteMetadata,
            _scope: &Scope,
        ) -> KernelResult<Option<Identity>> {
            Ok(request.header("x-user").map(Identity::new))
        }
    }

    /// Only the owner named in the guard options may pass.
    struct OwnerGuard;

    #[async_trait]
    impl Guard for OwnerGuard {
        fn keyname(&self) -> &str {
            "owner"
        }

        async fn is_authorized(
            &self,
            _request: &Request,
            identity: Option<&Identity>,
            options: &Value,
        ) -> KernelResult<bool> {
            Ok(identity.is_some_and(|identity| options["owner"] == identity.id.as_str()))
        }
    }

    struct DogsModule {
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Module for DogsModule {
        fn keyname(&self) -> &str {
            "dogs"
        }

        fn providers(&self) -> Vec<Provider> {
            let invocations = self.invocations.clone();
            let secret_invocations = self.invocations.clone();
            let controller = HandlerController::new()
                .handler("show", move |arguments| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    async move {
                        Ok(json!({
                            "id": arguments[0],
                            "sort": arguments[1],
                            "caller": arguments[2],
                        })
                        .into())
                    }
                })
                .handler("create", |arguments| async move {
                    let body = &arguments[0];
                    if body.get("name").is_none() {
                        return Err(HttpError::bad_request("Invalid dog")
                            .with_errors(vec![json!({ "field": "name", "reason": "required" })])
                            .into());
                    }
                    Ok(Response::new(StatusCode::CREATED)
                        .with_body(body.clone())
                        .into())
                })
                .handler("secret", move |_| {
                    secret_invocations.fetch_add(1, Ordering::SeqCst);
                    async move { Ok("bone location".into()) }
                })
                .handler("fail", |_| async move {
                    Err(KernelError::Other(eyre::eyre!("database unavailable")))
                });

            vec![
                Provider::singleton_controller("dogs", Arc::new(controller)),
                Provider::authenticator(HeaderAuthenticator),
                Provider::guard(OwnerGuard),
            ]
        }

        fn controllers(&self) -> Vec<ControllerDefinition> {
            vec![
                ControllerDefinition::new("dogs", "/api/1.0/dogs/")
                    .route(
                        RouteDefinition::get("/:id", "show")
                            .argument(ArgumentDescriptor::route_parameter("id"))
                            .argument(ArgumentDescriptor::query_parameter("sort"))
                            .argument(ArgumentDescriptor::Identity),
                    )
                    .route(
                        RouteDefinition::post("/", "create").argument(ArgumentDescriptor::Body),
                    )
                    .route(
                        RouteDefinition::get("/:id/secret", "secret")
                            .guard("owner", json!({ "owner": "alice" })),
                    )
                    .route(RouteDefinition::get("/:id/fail", "fail")),
            ]
        }
    }

    async fn kernel_with(extra: Vec<Provider>) -> (Kernel, Arc<AtomicUsize>) {
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut builder = Kernel::builder();
        for provider in extra {
            builder = builder.provider(provider);
        }
        let mut kernel = builder.build();
        kernel
            .init(
                Arc::new(DogsModule {
                    invocations: invocations.clone(),
                }),
                HashMap::new(),
            )
            .await
            .unwrap();
        (kernel, invocations)
    }

    fn trails() -> Vec<Provider> {
        vec![
            Provider::request_interceptor(Trail("first")),
            Provider::request_interceptor(Trail("second")),
            Provider::response_interceptor(Trail("first")),
            Provider::response_interceptor(Trail("second")),
        ]
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_url_request_resolves_every_argument() {
        let (kernel, invocations) = kernel_with(Vec::new()).await;

        let request = Request::new(
            Method::GET,
            "https://kennel.example.com/api/1.0/dogs/caniche%20royal?sort=ASC#profile",
        )
        .with_header("x-user", "alice");
        let response = kernel.handle_request(request).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["id"], "caniche royal");
        assert_eq!(response.body["sort"], "ASC");
        assert_eq!(response.body["caller"]["id"], "alice");
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interceptors_run_in_order_and_see_previous_output() {
        let (kernel, _) = kernel_with(trails()).await;

        let request =
            Request::new(Method::GET, "/api/1.0/dogs/rex").with_header(TRAIL_HEADER, "caller");
        let response = kernel.handle_request(request).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header(TRAIL_HEADER), Some("caller,first,second"));
        assert_eq!(response.header(RESPONSE_TRAIL_HEADER), Some("first,second"));
        assert_eq!(response.body["sort"], Value::Null);
        assert_eq!(response.body["caller"], Value::Null);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handler_response_passes_through_unchanged() {
        let (kernel, _) = kernel_with(Vec::new()).await;

        let request =
            Request::new(Method::POST, "/api/1.0/dogs").with_body(json!({ "name": "Rex" }));
        let response = kernel.handle_request(request).await;

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, json!({ "name": "Rex" }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_error_keeps_status_and_sub_errors() {
        let (kernel, _) = kernel_with(Vec::new()).await;

        let request =
            Request::new(Method::POST, "/api/1.0/dogs").with_body(json!({ "size": 3 }));
        let response = kernel.handle_request(request).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["name"], "HttpError");
        assert_eq!(response.body["message"], "Invalid dog");
        assert_eq!(response.body["errors"][0]["field"], "name");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unexpected_handler_error_is_a_500() {
        let (kernel, _) = kernel_with(Vec::new()).await;

        let response = kernel
            .handle_request(Request::new(Method::GET, "/api/1.0/dogs/rex/fail"))
            .await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body["name"], "Error");
        assert_eq!(response.body["message"], "database unavailable");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_guard_refusal_is_forbidden_without_invocation() {
        let (kernel, invocations) = kernel_with(Vec::new()).await;

        let request =
            Request::new(Method::GET, "/api/1.0/dogs/rex/secret").with_header("x-user", "bob");
        let response = kernel.handle_request(request).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.body["name"], "ForbiddenError");
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        let anonymous = kernel
            .handle_request(Request::new(Method::GET, "/api/1.0/dogs/rex/secret"))
            .await;
        assert_eq!(anonymous.status, StatusCode::FORBIDDEN);
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        let request =
            Request::new(Method::GET, "/api/1.0/dogs/rex/secret").with_header("x-user", "alice");
        let response = kernel.handle_request(request).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!("bone location"));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_chain_and_response_chain_run_on_not_found() {
        let mut providers = trails();
        providers.push(Provider::error_response_interceptor(Envelope));
        let (kernel, _) = kernel_with(providers).await;

        let response = kernel
            .handle_request(Request::new(Method::DELETE, "/api/1.0/dogs/rex"))
            .await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["kind"], "NotFoundError");
        assert_eq!(response.body["path"], "/api/1.0/dogs/rex");
        assert_eq!(response.body["error"]["name"], "NotFoundError");
        assert_eq!(response.header(RESPONSE_TRAIL_HEADER), Some("first,second"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_request_interceptor_is_reported() {
        let providers = vec![
            Provider::request_interceptor(Trail("first")),
            Provider::request_interceptor(Broken),
            Provider::response_interceptor(Trail("first")),
        ];
        let (kernel, invocations) = kernel_with(providers).await;

        let response = kernel
            .handle_request(Request::new(Method::GET, "/api/1.0/dogs/rex"))
            .await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body["name"], "InterceptionExecutionError");
        let message = response.body["message"].as_str().unwrap();
        assert!(message.contains("broken"));
        assert!(message.contains("interceptor exploded"));
        // Response interceptors still see the request as it was before interception.
        assert_eq!(response.header(RESPONSE_TRAIL_HEADER), Some("first"));
        assert_eq!(response.header(TRAIL_HEADER), None);
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_response_interceptor_is_reported() {
        let providers = vec![
            Provider::response_interceptor(Trail("first")),
            Provider::response_interceptor(Broken),
            Provider::response_interceptor(Trail("second")),
        ];
        let (kernel, invocations) = kernel_with(providers).await;

        let response = kernel
            .handle_request(Request::new(Method::GET, "/api/1.0/dogs/rex"))
            .await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body["name"], "InterceptionExecutionError");
        let message = response.body["message"].as_str().unwrap();
        assert!(message.contains("response interceptor 'broken'"));
        assert!(message.contains("request GET /api/1.0/dogs/rex"));
        assert!(message.contains("serializer exploded"));
        // The handler ran; only its response was lost.
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(response.header(RESPONSE_TRAIL_HEADER), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_error_interceptor_falls_back_to_default_error_response() {
        let providers = vec![
            Provider::error_response_interceptor(Envelope),
            Provider::error_response_interceptor(Broken),
            Provider::response_interceptor(Trail("first")),
        ];
        let (kernel, _) = kernel_with(providers).await;

        let response = kernel
            .handle_request(Request::new(Method::DELETE, "/api/1.0/dogs/rex"))
            .await;

        // The envelope is discarded with the failed chain; the original error shows through.
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["name"], "NotFoundError");
        assert_eq!(
            response.body["message"],
            "No route found for path: '/api/1.0/dogs/rex'."
        );
        assert!(response.body.get("kind").is_none());
        assert_eq!(response.header(RESPONSE_TRAIL_HEADER), Some("first"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_leading_double_slash_routes_like_single_slash() {
        let (kernel, invocations) = kernel_with(Vec::new()).await;

        for url in ["/api/1.0/dogs/rex", "//api/1.0/dogs/rex"] {
            let response = kernel.handle_request(Request::new(Method::GET, url)).await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.body["id"], "rex");
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }
}
