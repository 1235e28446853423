// Module lifecycle: import graph ordering, hook sequencing, scoped service tags and
// cross-module configuration defaults
#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use http::{Method, StatusCode};
    use keel::{
        Container, ControllerDefinition, HandlerController, Kernel, KernelError, KernelResult,
        KernelState, Module, Provider, Request, RouteDefinition,
        config::ConfigurationDefinition,
        core::TaggedRegistration,
        ports::RequestInterceptor,
    };
    use serde_json::json;

    type Graph = HashMap<&'static str, Vec<&'static str>>;

    #[derive(Clone)]
    struct Node {
        name: &'static str,
        graph: Arc<Graph>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Node {
        fn root(name: &'static str, graph: Graph) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let node = Arc::new(Node {
                name,
                graph: Arc::new(graph),
                log: log.clone(),
            });
            (node, log)
        }
    }

    #[async_trait]
    impl Module for Node {
        fn keyname(&self) -> &str {
            self.name
        }

        fn imports(&self) -> Vec<Arc<dyn Module>> {
            self.graph
                .get(self.name)
                .map(|children| {
                    children
                        .iter()
                        .map(|&child| {
                            Arc::new(Node {
                                name: child,
                                ..self.clone()
                            }) as Arc<dyn Module>
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        fn providers(&self) -> Vec<Provider> {
            match self.name {
                "root" => {
                    let controller = HandlerController::new()
                        .handler("ping", |_| async move { Ok("pong".into()) });
                    vec![Provider::singleton_controller("root", Arc::new(controller))]
                }
                _ => Vec::new(),
            }
        }

        fn configuration_definitions(&self) -> Vec<ConfigurationDefinition> {
            match self.name {
                "d" => vec![
                    ConfigurationDefinition::new("database_url")
                        .with_default("postgres://localhost/dogs"),
                ],
                "root" => vec![
                    ConfigurationDefinition::new("audit_database_url")
                        .defaulting_to("database_url"),
                ],
                _ => Vec::new(),
            }
        }

        fn controllers(&self) -> Vec<ControllerDefinition> {
            match self.name {
                "root" => vec![
                    ControllerDefinition::new("root", "/")
                        .route(RouteDefinition::get("/ping", "ping")),
                ],
                _ => Vec::new(),
            }
        }

        async fn on_init(&self, container: &mut Container) -> KernelResult<()> {
            self.log.lock().unwrap().push(format!(
                "on_init:{}:{}",
                self.name,
                container.configuration().len()
            ));
            Ok(())
        }

        async fn after_init(&self, container: &Container) -> KernelResult<()> {
            self.log.lock().unwrap().push(format!(
                "after_init:{}:{}",
                self.name,
                container.configuration().len()
            ));
            Ok(())
        }
    }

    fn diamond() -> Graph {
        HashMap::from([("root", vec!["b", "c"]), ("b", vec!["d"]), ("c", vec!["d"])])
    }

    struct Tag(&'static str);

    #[async_trait]
    impl RequestInterceptor for Tag {
        async fn intercept_request(&self, _request: Request) -> KernelResult<Request> {
            Err(KernelError::Unauthorized(format!("tagged by {}", self.0)))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_diamond_imports_initialize_once_in_dependency_order() {
        let (root, log) = Node::root("root", diamond());
        let mut kernel = Kernel::builder().build();
        kernel.init(root, HashMap::new()).await.unwrap();

        assert_eq!(kernel.state(), KernelState::AfterInitRun);
        assert_eq!(kernel.module_keynames(), vec!["d", "b", "c", "root"]);

        // Every on_init runs before configuration exists, every after_init once it does.
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "on_init:d:0",
                "on_init:b:0",
                "on_init:c:0",
                "on_init:root:0",
                "after_init:d:2",
                "after_init:b:2",
                "after_init:c:2",
                "after_init:root:2",
            ]
        );

        let response = kernel
            .handle_request(Request::new(Method::GET, "/ping"))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!("pong"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_circular_import_fails_initialization() {
        let graph = HashMap::from([("a", vec!["b"]), ("b", vec!["a"])]);
        let (root, log) = Node::root("a", graph);
        let mut kernel = Kernel::builder().build();

        let error = kernel.init(root, HashMap::new()).await.unwrap_err();
        assert!(matches!(
            &error,
            KernelError::KernelInitialization(message) if message.contains("a -> b -> a")
        ));
        assert_eq!(kernel.state(), KernelState::Uninitialized);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_init_is_rejected() {
        let (root, _) = Node::root("root", diamond());
        let mut kernel = Kernel::builder().build();
        kernel.init(root.clone(), HashMap::new()).await.unwrap();

        let error = kernel.init(root, HashMap::new()).await.unwrap_err();
        assert!(matches!(error, KernelError::KernelInitialization(_)));
        assert_eq!(kernel.state(), KernelState::AfterInitRun);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scoped_registrations_follow_instantiated_modules() {
        let (root, _) = Node::root("root", diamond());
        let mut kernel = Kernel::builder()
            .register(
                TaggedRegistration::new(Provider::request_interceptor(Tag("payments")))
                    .scoped_to("payments"),
            )
            .build();
        kernel.init(root, HashMap::new()).await.unwrap();

        let container = kernel.container().unwrap();
        assert!(container.request_interceptors().is_empty());
        let response = kernel
            .handle_request(Request::new(Method::GET, "/ping"))
            .await;
        assert_eq!(response.status, StatusCode::OK);

        let (root, _) = Node::root("root", diamond());
        let mut kernel = Kernel::builder()
            .register(
                TaggedRegistration::new(Provider::request_interceptor(Tag("d"))).scoped_to("d"),
            )
            .build();
        kernel.init(root, HashMap::new()).await.unwrap();

        let response = kernel
            .handle_request(Request::new(Method::GET, "/ping"))
            .await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response.body["message"]
                .as_str()
                .unwrap()
                .contains("tagged by d")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_configuration_defaults_can_reference_other_modules() {
        let (root, _) = Node::root("root", diamond());
        let mut kernel = Kernel::builder().build();
        kernel.init(root, HashMap::new()).await.unwrap();

        let configuration = kernel.configuration().unwrap();
        assert_eq!(
            configuration.get::<String>("audit_database_url").unwrap(),
            "postgres://localhost/dogs"
        );

        let (root, _) = Node::root("root", diamond());
        let mut kernel = Kernel::builder().build();
        kernel
            .init(
                root,
                HashMap::from([("database_url".to_string(), json!("postgres://db/prod"))]),
            )
            .await
            .unwrap();

        let configuration = kernel.configuration().unwrap();
        assert_eq!(
            configuration.get::<String>("audit_database_url").unwrap(),
            "postgres://db/prod"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_required_parameter_stops_before_router() {
        struct Strict;

        #[async_trait]
        impl Module for Strict {
            fn keyname(&self) -> &str {
                "strict"
            }

            fn configuration_definitions(&self) -> Vec<ConfigurationDefinition> {
                vec![ConfigurationDefinition::new("api_key").required()]
            }
        }

        let mut kernel = Kernel::builder().build();
        let error = kernel.init(Arc::new(Strict), HashMap::new()).await.unwrap_err();

        assert_eq!(error.kind(), "ConfigurationError");
        assert_eq!(kernel.state(), KernelState::ServiceTagsRegistered);
        assert!(kernel.router().is_none());
    }
}
