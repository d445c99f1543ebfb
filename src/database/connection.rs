use std::env;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use dotenv::dotenv;

use crate::error::{Error, Result};

pub fn establish_connection() -> Result<PgConnection> {
    dotenv().ok();

    let database_url =
        env::var("DATABASE_URL").map_err(|_| Error::Config("DATABASE_URL is not set".into()))?;
    PgConnection::establish(&database_url).map_err(Error::from)
}
