//! End-to-end flows through the real middleware chain: module rewriting,
//! conditional requests, and HMR propagation, without a network socket.

use std::path::Path;
use std::sync::Arc;

use skiff::pipeline::{Pipeline, RequestCtx};
use skiff::server::build_pipeline;
use skiff::watch::{apply_change, FileChange};
use skiff::{ServerConfig, ServerContext};

struct TestServer {
    _dir: tempfile::TempDir,
    ctx: Arc<ServerContext>,
    pipeline: Pipeline,
}

impl TestServer {
    fn new(setup: impl FnOnce(&Path)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let ctx = ServerContext::new(ServerConfig::new(dir.path())).unwrap();
        let pipeline = build_pipeline(&ctx, vec![]);
        Self {
            _dir: dir,
            ctx,
            pipeline,
        }
    }

    async fn get(&self, url: &str) -> RequestCtx {
        self.get_conditional(url, None).await
    }

    async fn get_conditional(&self, url: &str, if_none_match: Option<&str>) -> RequestCtx {
        let mut request = RequestCtx::new(
            self.ctx.clone(),
            url,
            if_none_match.map(str::to_string),
        );
        self.pipeline.run(&mut request).await.unwrap();
        request
    }

    fn write(&self, rel: &str, content: &str) {
        std::fs::write(self.ctx.root.join(rel), content).unwrap();
    }

    fn root_path(&self, rel: &str) -> std::path::PathBuf {
        self.ctx.root.join(rel)
    }
}

fn body_str(ctx: &RequestCtx) -> &str {
    std::str::from_utf8(ctx.body.as_deref().unwrap()).unwrap()
}

fn vue_project(root: &Path) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("node_modules/vue/dist")).unwrap();
    std::fs::write(
        root.join("node_modules/vue/package.json"),
        r#"{ "module": "dist/vue.esm.js" }"#,
    )
    .unwrap();
    std::fs::write(
        root.join("node_modules/vue/dist/vue.esm.js"),
        "export default { version: 'test' }",
    )
    .unwrap();
}

#[tokio::test]
async fn bare_import_and_env_rewrite() {
    let server = TestServer::new(vue_project);
    server.write("src/main.js", "import V from \"vue\";\nimport.meta.env;\n");

    let rsp = server.get("/src/main.js").await;
    assert_eq!(rsp.status, Some(200));
    let body = body_str(&rsp);
    assert!(body.starts_with(
        "import __ENV__ from \"/@skiff/env\"; import.meta.env = __ENV__;\n"
    ));
    assert!(body.contains("import V from \"/@modules/vue/dist/vue.esm.js\";"));

    // The env module itself is servable JavaScript.
    let env = server.get("/@skiff/env").await;
    assert_eq!(env.status, Some(200));
    assert!(body_str(&env).starts_with("export default {"));

    // And the bare module URL round-trips through the module server.
    let dep = server.get("/@modules/vue/dist/vue.esm.js").await;
    assert_eq!(dep.status, Some(200));
    assert!(body_str(&dep).contains("version: 'test'"));
}

#[tokio::test]
async fn relative_import_normalization_records_graph_edge() {
    let server = TestServer::new(|root| {
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/App.vue"), "<template/>").unwrap();
    });
    server.write("src/main.js", "import './App'\n");

    let rsp = server.get("/src/main.js").await;
    assert_eq!(body_str(&rsp), "import '/src/App.vue'\n");

    let graph = server.ctx.graph.lock();
    assert!(graph
        .importers_of("/src/App.vue")
        .unwrap()
        .contains("/src/main.js"));
    assert!(graph
        .importees_of("/src/main.js")
        .unwrap()
        .contains("/src/App.vue"));
}

#[tokio::test]
async fn non_js_import_gets_marker() {
    let server = TestServer::new(|root| {
        std::fs::write(root.join("logo.png"), [137u8, 80, 78, 71]).unwrap();
    });
    server.write("main.js", "import logo from './logo.png'\n");

    let rsp = server.get("/main.js").await;
    assert_eq!(body_str(&rsp), "import logo from '/logo.png?import'\n");
}

#[tokio::test]
async fn conditional_requests_require_etag_match_and_seen_url() {
    let server = TestServer::new(|_| {});
    server.write("x.js", "export const x = 1\n");

    // First request: 200 with an ETag; the URL is now seen.
    let first = server.get("/x.js").await;
    assert_eq!(first.status, Some(200));
    let etag = first.etag.clone().unwrap();

    // Conditional revalidation: 304, empty body.
    let second = server.get_conditional("/x.js", Some(&etag)).await;
    assert_eq!(second.status, Some(304));
    assert!(second.body.is_none());

    // Touch: same bytes, bumped mtime. Content is identical so the ETag is
    // stable and revalidation still succeeds.
    let bumped = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
    let f = std::fs::OpenOptions::new()
        .write(true)
        .open(server.root_path("x.js"))
        .unwrap();
    f.set_modified(bumped).unwrap();
    drop(f);
    let third = server.get_conditional("/x.js", Some(&etag)).await;
    assert_eq!(third.status, Some(304));

    // Changed bytes: 200 with a different ETag.
    server.write("x.js", "export const x = 2\n");
    let f = std::fs::OpenOptions::new()
        .write(true)
        .open(server.root_path("x.js"))
        .unwrap();
    f.set_modified(bumped + std::time::Duration::from_secs(2)).unwrap();
    drop(f);
    let fourth = server.get_conditional("/x.js", Some(&etag)).await;
    assert_eq!(fourth.status, Some(200));
    assert_ne!(fourth.etag.as_ref(), Some(&etag));

    // A fresh server instance has an empty seen set: the same conditional
    // request gets a full 200 even when the ETag would match.
    let cold_ctx = ServerContext::new(ServerConfig::new(&server.ctx.root)).unwrap();
    let cold_pipeline = build_pipeline(&cold_ctx, vec![]);
    let mut cold = RequestCtx::new(
        cold_ctx.clone(),
        "/x.js",
        fourth.etag.clone(),
    );
    cold_pipeline.run(&mut cold).await.unwrap();
    assert_eq!(cold.status, Some(200));
}

#[tokio::test]
async fn missing_module_is_not_found() {
    let server = TestServer::new(|_| {});
    let mut request = RequestCtx::new(server.ctx.clone(), "/src/missing.js", None);
    let err = server.pipeline.run(&mut request).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn self_accepting_change_produces_js_update_and_stamped_refetch() {
    let server = TestServer::new(|root| {
        std::fs::create_dir_all(root.join("src")).unwrap();
    });
    server.write("src/b.js", "export const b = 1\nimport.meta.hot.accept()\n");
    server.write("src/a.js", "import './b'\n");

    // Serve both so the graph and boundaries exist.
    server.get("/src/b.js").await;
    server.get("/src/a.js").await;
    assert!(server.ctx.graph.lock().is_self_accepting("/src/b.js"));

    let (_id, mut rx) = server.ctx.hmr.register();
    server.write("src/b.js", "export const b = 2\nimport.meta.hot.accept()\n");
    apply_change(&server.ctx, FileChange::Modified(server.root_path("src/b.js"))).await;

    let json = rx.recv().await.unwrap();
    let message: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(message["type"], "update");
    let update = &message["updates"][0];
    assert_eq!(update["type"], "js-update");
    assert_eq!(update["path"], "/src/b.js");
    assert_eq!(update["acceptedPath"], "/src/b.js");
    let timestamp = message["timestamp"].as_u64().unwrap();

    // An HMR-driven refetch of the importer stamps the changed dep.
    let refetch = server.get(&format!("/src/a.js?t={timestamp}")).await;
    assert!(body_str(&refetch).contains(&format!("/src/b.js?t={timestamp}")));

    // A plain fetch of the changed module serves the new content.
    let fresh = server.get("/src/b.js").await;
    assert!(body_str(&fresh).contains("const b = 2"));
}

#[tokio::test]
async fn change_without_boundary_full_reloads() {
    let server = TestServer::new(|root| {
        std::fs::create_dir_all(root.join("src")).unwrap();
    });
    server.write("src/b.js", "export const b = 1\n");
    server.write("src/a.js", "import './b'\n");

    server.get("/src/b.js").await;
    server.get("/src/a.js").await;

    let (_id, mut rx) = server.ctx.hmr.register();
    server.write("src/b.js", "export const b = 2\n");
    apply_change(&server.ctx, FileChange::Modified(server.root_path("src/b.js"))).await;

    let message: serde_json::Value =
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(message["type"], "full-reload");
    assert_eq!(message["path"], "/src/b.js");
}

#[tokio::test]
async fn rewrite_is_idempotent_on_rewritten_output() {
    let server = TestServer::new(vue_project);
    server.write("src/dep.js", "export const d = 1\n");
    server.write("src/main.js", "import V from \"vue\";\nimport './dep'\n");

    let once = server.get("/src/main.js").await;
    let rewritten = body_str(&once).to_string();

    // Feed the rewritten output back through as a new module: every
    // specifier is already a public path, so nothing changes.
    server.write("src/again.js", &rewritten);
    let twice = server.get("/src/again.js").await;
    assert_eq!(body_str(&twice), rewritten);
}

#[tokio::test]
async fn user_plugin_registers_middleware_and_watch_listener() {
    use async_trait::async_trait;
    use skiff::{Middleware, Next};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct HelloMiddleware;

    #[async_trait]
    impl Middleware for HelloMiddleware {
        async fn handle(
            &self,
            ctx: &mut RequestCtx,
            next: Next<'_>,
        ) -> skiff::Result<()> {
            if ctx.path == "/__hello" {
                ctx.set_js_body("export default 'hello'\n".to_string());
                return Ok(());
            }
            next.run(ctx).await
        }
    }

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.js"), "export {}\n").unwrap();
    let ctx = ServerContext::new(ServerConfig::new(dir.path())).unwrap();

    let seen_changes = Arc::new(AtomicUsize::new(0));
    let counter = seen_changes.clone();
    let plugin: skiff::Plugin = Box::new(move |setup| {
        setup.use_middleware(HelloMiddleware);
        setup.on_change(move |_change| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });
    let pipeline = build_pipeline(&ctx, vec![plugin]);

    // Plugin middleware answers its own route; everything else falls
    // through to the built-ins.
    let mut hello = RequestCtx::new(ctx.clone(), "/__hello", None);
    pipeline.run(&mut hello).await.unwrap();
    assert_eq!(hello.status, Some(200));

    let mut file = RequestCtx::new(ctx.clone(), "/a.js", None);
    pipeline.run(&mut file).await.unwrap();
    assert_eq!(file.status, Some(200));

    // Watch listeners observe every change event.
    apply_change(&ctx, FileChange::Modified(dir.path().join("a.js"))).await;
    assert_eq!(seen_changes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn client_runtime_served_verbatim() {
    let server = TestServer::new(|_| {});
    let rsp = server.get("/@skiff/client").await;
    assert_eq!(rsp.status, Some(200));
    let body = body_str(&rsp);
    assert!(body.contains("createHotContext"));
    // Not rewritten: no version stamps or module URLs injected.
    assert!(!body.contains("/@modules/"));
}

#[tokio::test]
async fn index_html_served_at_root() {
    let server = TestServer::new(|root| {
        std::fs::write(
            root.join("index.html"),
            "<html><body><script type=\"module\" src=\"/src/main.js\"></script></body></html>",
        )
        .unwrap();
    });
    let rsp = server.get("/").await;
    assert_eq!(rsp.status, Some(200));
    assert_eq!(rsp.content_type.as_deref(), Some("text/html; charset=utf-8"));
}
