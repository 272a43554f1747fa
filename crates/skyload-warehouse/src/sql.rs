//! The fixed star-schema statement catalogue.
//!
//! Two staging tables receive raw JSON through `COPY`; four dimensions and
//! one fact table are rebuilt from them on every full run.

use serde::Serialize;
use skyload_config::{RoleArn, S3Section};

/// One SQL statement and the table it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub table: &'static str,
    pub sql: String,
}

impl Statement {
    fn new(table: &'static str, sql: impl Into<String>) -> Self {
        Self {
            table,
            sql: sql.into(),
        }
    }
}

/// Object-storage locations and credentials for the bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    pub log_data: String,
    pub log_jsonpath: String,
    pub song_data: String,
    pub region: String,
    pub role_arn: RoleArn,
}

impl CopySource {
    pub fn from_settings(s3: &S3Section, role_arn: RoleArn) -> Self {
        Self {
            log_data: s3.log_data.clone(),
            log_jsonpath: s3.log_jsonpath.clone(),
            song_data: s3.song_data.clone(),
            region: s3.region.clone(),
            role_arn,
        }
    }
}

/// Single-quoted SQL string literal.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const DIM_USERS: &str = "dim_users";
pub const DIM_SONGS: &str = "dim_songs";
pub const DIM_ARTISTS: &str = "dim_artists";
pub const DIM_TIMES: &str = "dim_times";
pub const FACT_SONGPLAYS: &str = "fact_songplays";

/// Fact table first so no dimension is dropped while still referenced.
pub fn drop_statements() -> Vec<Statement> {
    [
        FACT_SONGPLAYS,
        DIM_USERS,
        DIM_SONGS,
        DIM_ARTISTS,
        DIM_TIMES,
        STAGING_EVENTS,
        STAGING_SONGS,
    ]
    .into_iter()
    .map(|table| Statement::new(table, format!("DROP TABLE IF EXISTS {table}")))
    .collect()
}

const CREATE_STAGING_EVENTS: &str = "\
CREATE TABLE IF NOT EXISTS staging_events (
    artist text,
    auth text,
    first_name varchar(20),
    gender varchar(3),
    item_in_session integer,
    last_name varchar(20),
    length double precision,
    level varchar(10),
    location text,
    method varchar(5),
    page varchar(50),
    registration numeric(15),
    session_id integer,
    song text,
    status integer,
    ts numeric(20),
    user_agent text,
    user_id integer
)
DISTSTYLE EVEN";

const CREATE_STAGING_SONGS: &str = "\
CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs integer,
    artist_id varchar(20),
    artist_latitude double precision,
    artist_longitude double precision,
    artist_location text,
    artist_name varchar(255),
    song_id varchar(50),
    title varchar(255),
    duration numeric(10,5),
    year integer
)
DISTSTYLE EVEN";

const CREATE_DIM_USERS: &str = "\
CREATE TABLE IF NOT EXISTS dim_users (
    user_id integer PRIMARY KEY SORTKEY,
    first_name varchar(20) NOT NULL,
    last_name varchar(20) NOT NULL,
    gender varchar(1) NOT NULL,
    level varchar(10) NOT NULL
)
DISTSTYLE ALL";

const CREATE_DIM_SONGS: &str = "\
CREATE TABLE IF NOT EXISTS dim_songs (
    song_id varchar(50) PRIMARY KEY,
    title varchar(255) NOT NULL SORTKEY,
    artist_id varchar(50) NOT NULL DISTKEY,
    year integer,
    duration numeric(10,5) NOT NULL
)";

const CREATE_DIM_ARTISTS: &str = "\
CREATE TABLE IF NOT EXISTS dim_artists (
    artist_id varchar(50) PRIMARY KEY,
    artist_name varchar(255) NOT NULL SORTKEY,
    artist_location varchar(255),
    latitude double precision,
    longitude double precision
)
DISTSTYLE AUTO";

const CREATE_DIM_TIMES: &str = "\
CREATE TABLE IF NOT EXISTS dim_times (
    time_id integer IDENTITY(0, 1) PRIMARY KEY,
    start_time timestamp NOT NULL SORTKEY,
    hour integer NOT NULL,
    day integer NOT NULL,
    week integer NOT NULL,
    month integer NOT NULL,
    year integer NOT NULL,
    weekday integer NOT NULL
)
DISTSTYLE AUTO";

// Foreign keys are informational on the warehouse but still name the
// dimensions, so this runs after them.
const CREATE_FACT_SONGPLAYS: &str = "\
CREATE TABLE IF NOT EXISTS fact_songplays (
    songplay_id integer IDENTITY(0, 1) PRIMARY KEY,
    start_time timestamp NOT NULL SORTKEY,
    user_id integer REFERENCES dim_users(user_id) NOT NULL,
    level varchar(10) NOT NULL,
    song_id varchar(50) REFERENCES dim_songs(song_id) NOT NULL,
    artist_id varchar(50) REFERENCES dim_artists(artist_id) NOT NULL,
    session_id integer NOT NULL,
    location varchar(255) NOT NULL,
    user_agent varchar(255) NOT NULL
)
DISTSTYLE AUTO";

pub fn create_statements() -> Vec<Statement> {
    vec![
        Statement::new(STAGING_EVENTS, CREATE_STAGING_EVENTS),
        Statement::new(STAGING_SONGS, CREATE_STAGING_SONGS),
        Statement::new(DIM_USERS, CREATE_DIM_USERS),
        Statement::new(DIM_SONGS, CREATE_DIM_SONGS),
        Statement::new(DIM_ARTISTS, CREATE_DIM_ARTISTS),
        Statement::new(DIM_TIMES, CREATE_DIM_TIMES),
        Statement::new(FACT_SONGPLAYS, CREATE_FACT_SONGPLAYS),
    ]
}

pub fn copy_statements(source: &CopySource) -> Vec<Statement> {
    let role = literal(&source.role_arn);
    let region = literal(&source.region);
    vec![
        Statement::new(
            STAGING_EVENTS,
            format!(
                "COPY staging_events FROM {}\nIAM_ROLE {role}\nREGION {region}\nFORMAT AS JSON {}",
                literal(&source.log_data),
                literal(&source.log_jsonpath),
            ),
        ),
        Statement::new(
            STAGING_SONGS,
            format!(
                "COPY staging_songs FROM {}\nIAM_ROLE {role}\nREGION {region}\nFORMAT AS JSON 'auto'",
                literal(&source.song_data),
            ),
        ),
    ]
}

/// Most recent rejected rows, one line of text per row.
pub const RECENT_LOAD_ERRORS: &str = "\
SELECT TRIM(filename) || ':' || CAST(line_number AS VARCHAR) || ' ' || TRIM(colname) || ': ' || TRIM(err_reason)
FROM stl_load_errors
ORDER BY starttime DESC
LIMIT 5";

const EVENT_TIMESTAMP: &str = "TIMESTAMP 'epoch' + ts/1000 * INTERVAL '1 second'";

const INSERT_DIM_USERS: &str = "\
INSERT INTO dim_users (user_id, first_name, last_name, gender, level)
SELECT user_id, first_name, last_name, gender, level
FROM (
    SELECT user_id, first_name, last_name, gender, level,
           ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY ts DESC) AS rn
    FROM staging_events
    WHERE user_id IS NOT NULL
      AND page = 'NextSong'
) latest
WHERE rn = 1";

const INSERT_DIM_SONGS: &str = "\
INSERT INTO dim_songs (song_id, title, artist_id, year, duration)
SELECT song_id, title, artist_id, year, duration
FROM staging_songs
WHERE song_id IS NOT NULL";

const INSERT_DIM_ARTISTS: &str = "\
INSERT INTO dim_artists (artist_id, artist_name, artist_location, latitude, longitude)
SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
FROM (
    SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude,
           ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY artist_name) AS rn
    FROM staging_songs
    WHERE artist_id IS NOT NULL
) one_per_artist
WHERE rn = 1";

const INSERT_FACT_SONGPLAYS: &str = "\
INSERT INTO fact_songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT TIMESTAMP 'epoch' + se.ts/1000 * INTERVAL '1 second' AS start_time,
       se.user_id,
       se.level,
       ss.song_id,
       ss.artist_id,
       se.session_id,
       se.location,
       se.user_agent
FROM staging_events se
JOIN staging_songs ss
  ON se.song = ss.title
 AND se.artist = ss.artist_name
WHERE se.page = 'NextSong'
  AND se.user_id IS NOT NULL";

fn insert_dim_times() -> String {
    let ts = EVENT_TIMESTAMP;
    format!(
        "INSERT INTO dim_times (start_time, hour, day, week, month, year, weekday)\n\
         SELECT DISTINCT {ts} AS start_time,\n\
         EXTRACT(hour FROM {ts}),\n\
         EXTRACT(day FROM {ts}),\n\
         EXTRACT(week FROM {ts}),\n\
         EXTRACT(month FROM {ts}),\n\
         EXTRACT(year FROM {ts}),\n\
         EXTRACT(dow FROM {ts})\n\
         FROM staging_events\n\
         WHERE ts IS NOT NULL"
    )
}

/// Dimensions first, the fact table last.
pub fn insert_statements() -> Vec<Statement> {
    vec![
        Statement::new(DIM_USERS, INSERT_DIM_USERS),
        Statement::new(DIM_SONGS, INSERT_DIM_SONGS),
        Statement::new(DIM_ARTISTS, INSERT_DIM_ARTISTS),
        Statement::new(DIM_TIMES, insert_dim_times()),
        Statement::new(FACT_SONGPLAYS, INSERT_FACT_SONGPLAYS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(statements: &[Statement]) -> Vec<&'static str> {
        statements.iter().map(|s| s.table).collect()
    }

    fn source() -> CopySource {
        CopySource::from_settings(
            &S3Section::default(),
            RoleArn::new("arn:aws:iam::123456789012:role/dwhRole"),
        )
    }

    #[test]
    fn drop_order_starts_with_fact() {
        let drops = drop_statements();
        assert_eq!(drops[0].table, FACT_SONGPLAYS);
        assert_eq!(drops[0].sql, "DROP TABLE IF EXISTS fact_songplays");
        assert_eq!(drops.len(), 7);
        assert_eq!(
            &tables(&drops)[5..],
            &[STAGING_EVENTS, STAGING_SONGS]
        );
    }

    #[test]
    fn create_order_ends_with_fact() {
        assert_eq!(
            tables(&create_statements()),
            vec![
                STAGING_EVENTS,
                STAGING_SONGS,
                DIM_USERS,
                DIM_SONGS,
                DIM_ARTISTS,
                DIM_TIMES,
                FACT_SONGPLAYS
            ]
        );
        for s in create_statements() {
            assert!(
                s.sql.starts_with(&format!("CREATE TABLE IF NOT EXISTS {}", s.table)),
                "{}",
                s.sql
            );
        }
    }

    #[test]
    fn copy_statements_carry_role_and_region() {
        let copies = copy_statements(&source());
        assert_eq!(tables(&copies), vec![STAGING_EVENTS, STAGING_SONGS]);
        assert!(copies[0].sql.contains("FROM 's3://udacity-dend/log_data'"));
        assert!(copies[0]
            .sql
            .contains("FORMAT AS JSON 's3://udacity-dend/log_json_path.json'"));
        assert!(copies[1].sql.contains("FORMAT AS JSON 'auto'"));
        for c in &copies {
            assert!(c
                .sql
                .contains("IAM_ROLE 'arn:aws:iam::123456789012:role/dwhRole'"));
            assert!(c.sql.contains("REGION 'us-west-2'"));
        }
    }

    #[test]
    fn literals_escape_quotes() {
        assert_eq!(literal("it's"), "'it''s'");
        let mut src = source();
        src.song_data = "s3://b/o'brien".to_owned();
        assert!(copy_statements(&src)[1].sql.contains("'s3://b/o''brien'"));
    }

    #[test]
    fn fact_insert_runs_last_with_join() {
        let inserts = insert_statements();
        let last = inserts.last().unwrap();
        assert_eq!(last.table, FACT_SONGPLAYS);
        assert!(last.sql.contains("ON se.song = ss.title"));
        assert!(last.sql.contains("AND se.artist = ss.artist_name"));
        assert!(last.sql.contains("se.page = 'NextSong'"));
        assert!(last.sql.contains("se.user_id IS NOT NULL"));
    }

    #[test]
    fn users_keep_latest_record() {
        let users = &insert_statements()[0];
        assert_eq!(users.table, DIM_USERS);
        assert!(users
            .sql
            .contains("ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY ts DESC)"));
        assert!(users.sql.contains("WHERE rn = 1"));
    }

    #[test]
    fn times_extract_every_part() {
        let times = insert_dim_times();
        for part in ["hour", "day", "week", "month", "year", "dow"] {
            assert!(times.contains(&format!("EXTRACT({part} FROM")), "{part}");
        }
        assert!(times.contains("SELECT DISTINCT"));
    }
}
