use serde::Serialize;

/// List response wrapper
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub limit: usize,
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, limit: usize) -> Self {
        Self {
            count: data.len(),
            data,
            limit,
        }
    }
}
