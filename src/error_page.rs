use std::collections::HashMap;
use std::fs;

use log::warn;

use crate::header::HeaderName;
use crate::{Response, ServerConfig, StatusCode};

/// Error pages of a single virtual host.
///
/// Configured error page files are read once, when the pages are loaded, so
/// creating an error response never touches the file system. Status codes
/// without a (readable) page use a generated HTML page.
#[derive(Clone, Debug, Default)]
pub struct ErrorPages {
    pages: HashMap<StatusCode, Vec<u8>>,
}

impl ErrorPages {
    /// Load the error pages configured for `server`.
    ///
    /// Pages that can't be read are logged and replaced by the generated page.
    pub fn load(server: &ServerConfig) -> ErrorPages {
        let mut pages = HashMap::new();
        for (status, path) in server.error_pages() {
            match fs::read(path) {
                Ok(page) => {
                    let _ = pages.insert(status, page);
                }
                Err(err) => warn!(
                    "failed to read error page for status {status} at '{}': {err}, using default page",
                    path.display()
                ),
            }
        }
        ErrorPages { pages }
    }

    /// Returns the body of the error page for `status`.
    pub fn body(&self, status: StatusCode) -> Vec<u8> {
        match self.pages.get(&status) {
            Some(page) => page.clone(),
            None => default_page(status).into_bytes(),
        }
    }

    /// Create an error response for `status`.
    pub fn response(&self, status: StatusCode) -> Response {
        Response::build_new(status)
            .with_header(HeaderName::CONTENT_TYPE, b"text/html")
            .with_body(self.body(status))
    }
}

/// Generated error page.
fn default_page(status: StatusCode) -> String {
    let reason = status.reason();
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"UTF-8\"><title>{status} {reason}</title></head>\n\
         <body>\n\
         <h1>{status} {reason}</h1>\n\
         <hr><p>webserv</p>\n\
         </body>\n\
         </html>\n"
    )
}
