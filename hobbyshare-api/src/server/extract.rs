//! Request extractors and the JSON response wrapper. Every rejection is a [`ServerError`].

use crate::server::ServerError;
use axum::{
    Json as AxumJson,
    extract::{FromRequest, FromRequestParts, Multipart, Query as AxumQuery, Request},
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use bytes::Bytes;
use headers::ContentType;
use hobbyshare_common::storage::ImageFile;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

const REQUEST_PART: &str = "request";
const IMAGES_PART: &str = "images";

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        let Self(value) = self;

        match serde_json::to_vec(&value) {
            Ok(body) => (TypedHeader(ContentType::json()), body).into_response(),
            Err(err) => ServerError::JsonResponse(err).into_response(),
        }
    }
}

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

/// A multipart body carrying a JSON `request` part and any number of `images` files.
#[derive(Clone, Debug)]
pub struct PostForm<T> {
    pub request: T,
    pub images: Vec<ImageFile>,
}

impl<S, T> FromRequest<S> for PostForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state).await?;

        let mut request = None;
        let mut images = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);

            match name.as_deref() {
                Some(REQUEST_PART) => {
                    let bytes = field.bytes().await?;
                    request = Some(
                        serde_json::from_slice(&bytes).map_err(ServerError::InvalidRequestPart)?,
                    );
                }
                Some(IMAGES_PART) => {
                    let file_name = field.file_name().unwrap_or_default().to_owned();
                    let content_type = field.content_type().map(str::to_owned);
                    let data: Bytes = field.bytes().await?;

                    // Browsers send an empty part when no file was picked.
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }

                    images.push(ImageFile {
                        file_name,
                        content_type,
                        data,
                    });
                }
                other => debug!(field = ?other, "Ignoring unexpected multipart field"),
            }
        }

        Ok(Self {
            request: request.ok_or(ServerError::MissingRequestPart)?,
            images,
        })
    }
}
