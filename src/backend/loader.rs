use futures::future::BoxFuture;
use image::DynamicImage;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("load timed out")]
    Timeout,
}

/// Fetches one page image. The preloader runs each returned future as its own
/// task and may abort it at any point.
pub trait PageLoader: Send + Sync + 'static {
    type Image: Send + Sync + 'static;

    fn load(&self, url: &str) -> BoxFuture<'static, Result<Self::Image, LoadError>>;
}

/// Downloads pages over HTTP and decodes them into `DynamicImage`s.
#[derive(Clone)]
pub struct HttpPageLoader {
    client: reqwest::Client,
}

impl HttpPageLoader {
    /// Shares the connection pool of the catalog client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl PageLoader for HttpPageLoader {
    type Image = DynamicImage;

    fn load(&self, url: &str) -> BoxFuture<'static, Result<DynamicImage, LoadError>> {
        let client = self.client.clone();
        let url = url.to_string();

        Box::pin(async move {
            let response = client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(LoadError::Status(response.status().as_u16()));
            }
            let bytes = response.bytes().await?;

            decode_page(&bytes)
        })
    }
}

pub fn decode_page(bytes: &[u8]) -> Result<DynamicImage, LoadError> {
    let image = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;
    Ok(image)
}
