use actix_web::web::{Data, Path};
use actix_web::HttpResponse;

use crate::error::Error;
use crate::storer::FileStorer;

pub async fn fetch<S>(code: Path<(String,)>, storer: Data<S>) -> Result<HttpResponse, Error>
where
    S: FileStorer + 'static,
{
    let code = code.into_inner().0;
    let content = storer.read(&code)?;
    Ok(HttpResponse::Ok().content_type("application/octet-stream").body(content))
}
