use crate::{
    collection::Direction,
    models::{Category, Mode},
    store::Submission,
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Validate, Deserialize)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 500, message = "Text must be 1-500 characters"))]
    pub text: String,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be within [-90, 90]"))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be within [-180, 180]"))]
    pub lng: f64,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub category: Option<Category>,
}

impl From<CreatePostRequest> for Submission {
    fn from(req: CreatePostRequest) -> Self {
        Submission {
            text: req.text,
            lat: req.lat,
            lng: req.lng,
            mode: req.mode,
            category: req.category,
        }
    }
}

/// `?limit=` on list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// `?limit=&order=asc|desc` on a single bucket
#[derive(Debug, Default, Deserialize)]
pub struct BucketListParams {
    pub limit: Option<usize>,
    #[serde(default)]
    pub order: Direction,
}
