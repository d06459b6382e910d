use std::path::Path;

use hermitdb::error::DatabaseError;

pub fn validate_directory(input: &str) -> Result<String, DatabaseError> {
    if !Path::new(input).is_dir() {
        return Err(DatabaseError::InvalidFilePath(input.to_string()));
    }

    Ok(input.to_string())
}
