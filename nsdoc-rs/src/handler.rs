//! Maps HTTP requests to namespace names and answers them from the [DocCache](DocCache).
//!
//! A [DocHandler](DocHandler) serves a single root namespace below an optional mount point. The
//! request path (relative to the mount point) selects the namespace: **/** is the root itself,
//! **/net/http/** becomes **root/net/http**. Paths are percent-decoded and cleaned first, so that
//! duplicate slashes as well as **.** and **..** segments are resolved. A path which doesn't
//! decode to valid UTF-8 is answered with **400 Bad Request**.
//!
//! Each namespace is a directory, therefore all paths have to end with a slash. A request for
//! **/net** is redirected (**301 Moved Permanently**) to **net/** relative to the requested
//! location, keeping the query string intact. This way the relative links in rendered pages (like
//! the ones to sub namespaces) resolve properly.
//!
//! Only **GET** and **HEAD** are supported. Resolving a name might fail, in which case the
//! [ErrorHandler](ErrorHandler) decides how to respond. By default, names which cannot be
//! imported yield **404 Not Found** and all other errors yield **500 Internal Server Error**.
//!
//! # Installation
//!
//! Use [install](install) to create a handler (along with its cache) based on the system config
//! and to register both in the [Platform](crate::platform::Platform). The
//! [Server](crate::server::Server) picks up the handler from there.
use std::sync::Arc;

use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS};
use hyper::{Body, Method, Request, Response, StatusCode};

use crate::cache::DocCache;
use crate::config::Config;
use crate::content::serve_content;
use crate::error::DocError;
use crate::options::Options;
use crate::platform::Platform;

/// Decides how to respond if resolving a name failed.
pub trait ErrorHandler: Send + Sync {
    /// Creates the response for the given request and error.
    fn handle_error(&self, request: &Request<Body>, error: &DocError) -> Response<Body>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Request<Body>, &DocError) -> Response<Body> + Send + Sync,
{
    fn handle_error(&self, request: &Request<Body>, error: &DocError) -> Response<Body> {
        self(request, error)
    }
}

/// Responds with **404 Not Found** for import errors and **500 Internal Server Error** otherwise.
#[derive(Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle_error(&self, request: &Request<Body>, error: &DocError) -> Response<Body> {
        if error.is_import() {
            log::debug!("{} {}: {}", request.method(), request.uri(), error);
            status_response(StatusCode::NOT_FOUND)
        } else {
            log::error!("{} {}: {:#}", request.method(), request.uri(), error.cause());
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Creates a plain text response which simply contains the reason phrase of the given status.
pub fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::from(format!(
        "{}\n",
        status.canonical_reason().unwrap_or("Error")
    )));
    *response.status_mut() = status;
    let _ = response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    let _ = response
        .headers_mut()
        .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    response
}

/// Serves the documentation of a root namespace and all namespaces below it.
pub struct DocHandler {
    root: String,
    mount: String,
    cache: Arc<DocCache>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl DocHandler {
    /// Creates a handler based on the given options, which serves from the given cache.
    pub fn new(options: &Options, cache: Arc<DocCache>) -> Self {
        DocHandler {
            root: options.root().to_owned(),
            mount: options.mount_point().to_owned(),
            cache,
            error_handler: options.error_handler_value(),
        }
    }

    /// Provides access to the underlying cache.
    pub fn cache(&self) -> &Arc<DocCache> {
        &self.cache
    }

    /// Handles the given request.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let path = request.uri().path();
        let relative_path = match self.strip_mount(path) {
            Some(relative_path) => relative_path,
            None => return status_response(StatusCode::NOT_FOUND),
        };

        if request.method() != Method::GET && request.method() != Method::HEAD {
            let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
            let _ = response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        if !path.ends_with('/') {
            return redirect(path, request.uri().query());
        }

        let decoded_path = match urlencoding::decode(relative_path) {
            Ok(decoded_path) => decoded_path,
            Err(_) => return status_response(StatusCode::BAD_REQUEST),
        };

        let name = self.name_for(&decoded_path);
        match self.cache.resolve(&name).await {
            Ok(artifact) => serve_content(&request, &artifact),
            Err(error) => self.error_handler.handle_error(&request, &error),
        }
    }

    /// Returns the path relative to the mount point or **None** if the path is outside of it.
    fn strip_mount<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.mount.is_empty() {
            return Some(path);
        }

        match path.strip_prefix(self.mount.as_str()) {
            Some("") => Some("/"),
            Some(relative_path) if relative_path.starts_with('/') => Some(relative_path),
            _ => None,
        }
    }

    /// Determines the namespace name for the given path (relative to the mount point).
    fn name_for(&self, relative_path: &str) -> String {
        let cleaned = clean_path(relative_path);
        if cleaned == "/" {
            self.root.clone()
        } else {
            format!("{}{}", self.root, cleaned)
        }
    }
}

/// Redirects to the last segment of the given path with a trailing slash appended.
///
/// The location is relative, so that it works behind proxies which rewrite paths.
fn redirect(path: &str, query: Option<&str>) -> Response<Body> {
    let mut location = format!("{}/", base_name(path));
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        location.push('?');
        location.push_str(query);
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    match HeaderValue::from_str(&location) {
        Ok(location) => {
            let _ = response.headers_mut().insert(LOCATION, location);
            response
        }
        Err(_) => status_response(StatusCode::BAD_REQUEST),
    }
}

/// Returns the last segment of the given path.
///
/// # Examples
///
/// ```
/// # use nsdoc::handler::base_name;
/// assert_eq!(base_name("/acme/net"), "net");
/// assert_eq!(base_name("net"), "net");
/// assert_eq!(base_name("/acme/net//"), "net");
/// assert_eq!(base_name("/"), "/");
/// ```
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }

    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}

/// Normalizes the given path into an absolute one without any **.** or **..** segments, duplicate
/// or trailing slashes.
///
/// # Examples
///
/// ```
/// # use nsdoc::handler::clean_path;
/// assert_eq!(clean_path("/net/http/"), "/net/http");
/// assert_eq!(clean_path("//net/./http"), "/net/http");
/// assert_eq!(clean_path("/net/../io/"), "/io");
/// assert_eq!(clean_path("/../../"), "/");
/// assert_eq!(clean_path(""), "/");
/// ```
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => (),
            ".." => {
                let _ = segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

/// Creates a documentation handler based on the system config and registers it (along with its
/// cache) in the given platform.
///
/// See [Options::from_config](Options::from_config) for the supported settings. If no config is
/// present, the defaults are used.
pub fn install(platform: &Arc<Platform>) -> anyhow::Result<Arc<DocHandler>> {
    let options = match platform.find::<Config>() {
        Some(config) => Options::from_config(&config.current()),
        None => Options::new(crate::options::DEFAULT_ROOT),
    };

    install_with(platform, options)
}

/// Creates a documentation handler using the given options and registers it (along with its
/// cache) in the given platform.
///
/// Fails if the template cannot be compiled.
pub fn install_with(platform: &Arc<Platform>, options: Options) -> anyhow::Result<Arc<DocHandler>> {
    let cache = options.build_cache()?;
    let handler = Arc::new(DocHandler::new(&options, cache.clone()));

    platform.register::<DocCache>(cache);
    platform.register::<DocHandler>(handler.clone());

    Ok(handler)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hyper::{Body, Request, Response, StatusCode};

    use crate::error::DocError;
    use crate::handler::{install_with, status_response, DocHandler};
    use crate::options::Options;
    use crate::package::Package;
    use crate::platform::Platform;

    fn inspector(name: &str) -> anyhow::Result<Option<Package>> {
        match name {
            "acme" | "acme/net" | "acme/net/http" | "acme/my mod" => Ok(Some(Package {
                name: name.rsplit('/').next().unwrap_or(name).to_owned(),
                import_path: name.to_owned(),
                ..Package::default()
            })),
            "acme/broken" => Ok(Some(Package {
                name: "broken".to_owned(),
                import_path: name.to_owned(),
                ..Package::default()
            })),
            _ => Ok(None),
        }
    }

    fn renderer(package: &Package) -> anyhow::Result<Vec<u8>> {
        if package.name == "broken" {
            Err(anyhow::anyhow!("Cannot render"))
        } else {
            Ok(format!("<p>{}</p>", package.import_path).into_bytes())
        }
    }

    fn handler(options: Options) -> Arc<DocHandler> {
        install_with(
            &Platform::new(),
            options
                .inspector(Arc::new(inspector))
                .renderer(Arc::new(renderer)),
        )
        .unwrap()
    }

    async fn get(handler: &DocHandler, uri: &str) -> (StatusCode, Option<String>, String) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        call(handler, request).await
    }

    async fn call(handler: &DocHandler, request: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = handler.handle(request).await;
        let status = response.status();
        let location = response
            .headers()
            .get("location")
            .map(|value| value.to_str().unwrap().to_owned());
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, location, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn names_are_derived_from_paths() {
        crate::testing::test_async(async {
            let handler = handler(Options::new("acme"));

            assert_eq!(get(&handler, "/").await.2, "<p>acme</p>");
            assert_eq!(get(&handler, "/net/").await.2, "<p>acme/net</p>");
            assert_eq!(get(&handler, "//net/./http/").await.2, "<p>acme/net/http</p>");
            assert_eq!(get(&handler, "/net/../net/http/").await.2, "<p>acme/net/http</p>");
            assert_eq!(get(&handler, "/../").await.2, "<p>acme</p>");
            assert_eq!(
                handler.cache().names(),
                vec!["acme".to_owned(), "acme/net".to_owned(), "acme/net/http".to_owned()]
            );

            handler.cache().shutdown().await;
        });
    }

    #[test]
    fn paths_are_percent_decoded() {
        crate::testing::test_async(async {
            let handler = handler(Options::new("acme"));

            assert_eq!(get(&handler, "/my%20mod/").await.2, "<p>acme/my mod</p>");
            assert_eq!(get(&handler, "/net%2Fhttp/").await.2, "<p>acme/net/http</p>");
            assert_eq!(get(&handler, "/%FF/").await.0, StatusCode::BAD_REQUEST);

            handler.cache().shutdown().await;
        });
    }

    #[test]
    fn missing_trailing_slashes_are_redirected() {
        crate::testing::test_async(async {
            let handler = handler(Options::new("acme"));

            let (status, location, _) = get(&handler, "/net").await;
            assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
            assert_eq!(location.as_deref(), Some("net/"));

            let (status, location, _) = get(&handler, "/net/http?tab=index&x=1").await;
            assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
            assert_eq!(location.as_deref(), Some("http/?tab=index&x=1"));

            // Redirects never render anything...
            assert!(handler.cache().is_empty());
        });
    }

    #[test]
    fn errors_are_mapped_to_status_codes() {
        crate::testing::test_async(async {
            let handler = handler(Options::new("acme"));

            let (status, _, body) = get(&handler, "/unknown/").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "Not Found\n");

            let (status, _, body) = get(&handler, "/broken/").await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "Internal Server Error\n");

            assert!(handler.cache().is_empty());
        });
    }

    #[test]
    fn only_get_and_head_are_supported() {
        crate::testing::test_async(async {
            let handler = handler(Options::new("acme"));

            let request = Request::post("/").body(Body::empty()).unwrap();
            let response = handler.handle(request).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.headers().get("allow").unwrap(), "GET, HEAD");

            let request = Request::head("/").body(Body::empty()).unwrap();
            let (status, _, body) = call(&handler, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "");

            handler.cache().shutdown().await;
        });
    }

    #[test]
    fn mount_points_are_respected() {
        crate::testing::test_async(async {
            let handler = handler(Options::new("acme").mount("/docs"));

            assert_eq!(get(&handler, "/docs/").await.2, "<p>acme</p>");
            assert_eq!(get(&handler, "/docs/net/").await.2, "<p>acme/net</p>");
            assert_eq!(get(&handler, "/docs").await.1.as_deref(), Some("docs/"));
            assert_eq!(get(&handler, "/other/").await.0, StatusCode::NOT_FOUND);
            assert_eq!(get(&handler, "/docsnet/").await.0, StatusCode::NOT_FOUND);

            handler.cache().shutdown().await;
        });
    }

    #[test]
    fn custom_error_handlers_are_invoked() {
        crate::testing::test_async(async {
            let error_handler = |_: &Request<Body>, error: &DocError| -> Response<Body> {
                if error.is_import() {
                    status_response(StatusCode::GONE)
                } else {
                    status_response(StatusCode::SERVICE_UNAVAILABLE)
                }
            };
            let handler = handler(Options::new("acme").error_handler(Arc::new(error_handler)));

            assert_eq!(get(&handler, "/unknown/").await.0, StatusCode::GONE);
            assert_eq!(
                get(&handler, "/broken/").await.0,
                StatusCode::SERVICE_UNAVAILABLE
            );
        });
    }

    #[test]
    fn handlers_are_registered_in_the_platform() {
        let platform = Platform::new();
        let _ = install_with(&platform, Options::new("acme")).unwrap();

        assert!(platform.find::<DocHandler>().is_some());
        assert!(platform.find::<crate::cache::DocCache>().is_some());
    }
}
