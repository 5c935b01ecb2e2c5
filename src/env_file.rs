//! `.env` loading. Values never override variables already present in the
//! process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum EnvFileError {
    #[error("env file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Syntax { path: PathBuf, line: usize, message: String },
}

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
    /// Variables taken from the file; the rest were already set.
    pub applied: usize,
}

/// Load `explicit` if given (it must exist), else `./.env` when present.
pub fn load(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, EnvFileError> {
    let (path, is_explicit) = match explicit {
        Some(p) if p.is_file() => (p.to_path_buf(), true),
        Some(p) => return Err(EnvFileError::NotFound(p.to_path_buf())),
        None => {
            let default = PathBuf::from(".env");
            if !default.is_file() {
                return Ok(None);
            }
            (default, false)
        }
    };

    let raw = std::fs::read_to_string(&path).map_err(|source| EnvFileError::Io {
        path: path.clone(),
        source,
    })?;
    let mut applied = 0;
    for (key, value) in parse(&path, &raw)? {
        if std::env::var_os(&key).is_none() {
            // SAFETY: called from main before any other thread is started.
            unsafe {
                std::env::set_var(&key, value);
            }
            applied += 1;
        }
    }
    Ok(Some(LoadedEnvFile {
        path,
        explicit: is_explicit,
        applied,
    }))
}

/// Parse `.env` text; later assignments of a key win.
pub fn parse(path: &Path, raw: &str) -> Result<BTreeMap<String, String>, EnvFileError> {
    let mut vars = BTreeMap::new();
    for (index, line) in raw.lines().enumerate() {
        let parsed = parse_line(line).map_err(|message| EnvFileError::Syntax {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        })?;
        if let Some((key, value)) = parsed {
            vars.insert(key, value);
        }
    }
    Ok(vars)
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, value) = line.split_once('=').ok_or("missing '=' in assignment")?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), parse_value(value.trim())?)))
}

fn parse_value(value: &str) -> Result<String, String> {
    let quote = match value.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            // unquoted: inline comments end the value
            let end = value.find(" #").unwrap_or(value.len());
            let value = if value.starts_with('#') { "" } else { &value[..end] };
            return Ok(value.trim_end().to_string());
        }
    };

    let mut out = String::new();
    let mut chars = value[1..].chars();
    while let Some(c) = chars.next() {
        match c {
            c if c == quote => {
                let rest = chars.as_str().trim();
                if rest.is_empty() || rest.starts_with('#') {
                    return Ok(out);
                }
                return Err(format!("unexpected characters after closing {} quote", quote));
            }
            '\\' if quote == '"' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Err("unterminated escape sequence".to_string()),
            },
            c => out.push(c),
        }
    }
    Err(format!("unterminated {} quoted value", quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(raw: &str) -> BTreeMap<String, String> {
        parse(Path::new(".env"), raw).unwrap()
    }

    #[test]
    fn parses_common_forms() {
        let vars = parsed(
            "# database\nexport DB_HOST=db.internal\nDB_PORT = 5433 # non-default\nDB_PASSWORD=\"p#ss \\\"q\\\"\"\nREFRESH_BEARER_TOKEN='a\\b'\nEMPTY=\n",
        );
        assert_eq!(vars["DB_HOST"], "db.internal");
        assert_eq!(vars["DB_PORT"], "5433");
        assert_eq!(vars["DB_PASSWORD"], "p#ss \"q\"");
        assert_eq!(vars["REFRESH_BEARER_TOKEN"], "a\\b");
        assert_eq!(vars["EMPTY"], "");
    }

    #[test]
    fn hash_inside_unquoted_value_is_kept() {
        assert_eq!(parsed("SECRET_NAME=prod#1\n")["SECRET_NAME"], "prod#1");
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse(Path::new("conf.env"), "A=1\nnot an assignment\n").unwrap_err();
        assert!(matches!(err, EnvFileError::Syntax { line: 2, .. }));
        assert!(parse(Path::new(".env"), "A=\"open").is_err());
        assert!(parse(Path::new(".env"), "A='x' y").is_err());
        assert!(parse(Path::new(".env"), "BAD KEY=1").is_err());
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.env");
        assert!(matches!(load(Some(&missing)), Err(EnvFileError::NotFound(_))));
    }

    #[test]
    fn process_environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(
            &path,
            "LAUNDRY_ETL_ENV_FILE_TEST_PATH=from-file\nLAUNDRY_ETL_ENV_FILE_TEST_FRESH=fresh\n",
        )
        .unwrap();
        // SAFETY: these variable names are unique to this test.
        unsafe {
            std::env::set_var("LAUNDRY_ETL_ENV_FILE_TEST_PATH", "from-process");
        }

        let loaded = load(Some(&path)).unwrap().unwrap();
        assert!(loaded.explicit);
        assert_eq!(loaded.applied, 1);
        assert_eq!(std::env::var("LAUNDRY_ETL_ENV_FILE_TEST_PATH").unwrap(), "from-process");
        assert_eq!(std::env::var("LAUNDRY_ETL_ENV_FILE_TEST_FRESH").unwrap(), "fresh");
    }
}
