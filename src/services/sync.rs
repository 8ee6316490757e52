// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Incremental GitHub activity sync.
//!
//! One invocation handles one member:
//! 1. Load the existing archive from Open Humans
//! 2. Resume from the last archived week (or the account creation week),
//!    dropping any partially fetched copy of that week
//! 3. Fetch week by week until one week past today
//! 4. Replace the stored archive, on every exit path
//!
//! When the GitHub realm budget runs out the partial archive is stored and
//! the whole sync is re-enqueued after a delay. The next invocation prunes
//! whatever partial week was written.

use crate::config::SyncSettings;
use crate::error::{AppError, Result};
use crate::models::archive::records_from_response;
use crate::models::{ActivityArchive, ActivityRecord, FileMetadata, MemberProfile, RemoteFile};
use crate::services::github::{account_creation_date, account_url, feed_week_url};
use crate::time_utils::{format_utc_rfc3339, IsoWeek};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde_json::Value;
use std::time::Duration;

/// Rate-limited GET against the GitHub API.
#[async_trait]
pub trait ActivityFetcher: Send + Sync {
    /// Fetch `url` charging the named realm. Fails with
    /// [`AppError::RateLimited`] when the realm is exhausted and `wait` is
    /// false.
    async fn get(&self, url: &str, realm: &str, wait: bool) -> Result<Value>;
}

/// Member file storage (Open Humans).
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn exchange_token(&self, access_token: &str) -> Result<MemberProfile>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Delete files with the given basename. Missing files are not an error.
    async fn delete_file(&self, access_token: &str, member_id: &str, file_basename: &str)
        -> Result<()>;

    async fn upload(
        &self,
        basename: &str,
        contents: Vec<u8>,
        metadata: &FileMetadata,
        access_token: &str,
        member_id: &str,
    ) -> Result<()>;
}

/// Re-invocation of a member's sync.
#[async_trait]
pub trait SyncScheduler: Send + Sync {
    async fn enqueue_sync(&self, oh_id: &str, delay: Duration) -> Result<()>;
}

/// Bookkeeping for completed syncs.
#[async_trait]
pub trait SyncRecorder: Send + Sync {
    async fn record_success(&self, oh_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Where the next weekly fetch resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    pub date: NaiveDate,
}

impl SyncCursor {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn week(&self) -> IsoWeek {
        IsoWeek::of(self.date)
    }

    /// Move exactly one week forward.
    pub fn advance(self) -> Self {
        Self {
            date: self.date + Days::new(7),
        }
    }
}

/// Resume point: the last record's date, or the account creation date for
/// an empty archive.
pub fn determine_start(
    archive: &ActivityArchive,
    account_created: Option<NaiveDate>,
) -> Result<SyncCursor> {
    match archive.last() {
        Some(record) => Ok(SyncCursor::new(record.day()?)),
        None => account_created.map(SyncCursor::new).ok_or_else(|| {
            AppError::InvalidData("empty archive and no account creation date".to_string())
        }),
    }
}

/// Drop every record belonging to `week`, keeping the rest in order.
pub fn prune_partial_week(mut archive: ActivityArchive, week: IsoWeek) -> ActivityArchive {
    archive.retain(|record| !matches!(record.week(), Ok(w) if w == week));
    archive
}

/// First file in the listing carrying the marker tag.
pub fn find_archive_file<'a>(profile: &'a MemberProfile, marker_tag: &str) -> Option<&'a RemoteFile> {
    profile.files.iter().find(|file| file.has_tag(marker_tag))
}

/// The week the paging loop stops at (exclusive).
pub fn horizon_week(today: NaiveDate) -> IsoWeek {
    IsoWeek::of(today + Days::new(7))
}

/// Paging loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Fetching { cursor: SyncCursor, weeks_fetched: u32 },
    RateLimited { weeks_fetched: u32 },
    Done { weeks_fetched: u32 },
}

/// How a sync invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Caught up to the horizon; archive stored.
    Completed { weeks_fetched: u32, records: usize },
    /// Realm exhausted; partial archive stored and a retry enqueued.
    Rescheduled {
        weeks_fetched: u32,
        records: usize,
        delay: Duration,
    },
}

/// Sync engine for one member, built per invocation.
pub struct SyncEngine<F, S, Q, R> {
    fetcher: F,
    store: S,
    scheduler: Q,
    recorder: R,
    settings: SyncSettings,
}

impl<F, S, Q, R> SyncEngine<F, S, Q, R>
where
    F: ActivityFetcher,
    S: ArchiveStore,
    Q: SyncScheduler,
    R: SyncRecorder,
{
    pub fn new(fetcher: F, store: S, scheduler: Q, recorder: R, settings: SyncSettings) -> Self {
        Self {
            fetcher,
            store,
            scheduler,
            recorder,
            settings,
        }
    }

    /// Run one sync invocation for a member.
    pub async fn sync(&self, oh_id: &str, oh_access_token: &str) -> Result<SyncOutcome> {
        self.sync_at(oh_id, oh_access_token, Utc::now().date_naive())
            .await
    }

    /// Run one sync invocation with an explicit "today".
    pub async fn sync_at(
        &self,
        oh_id: &str,
        oh_access_token: &str,
        today: NaiveDate,
    ) -> Result<SyncOutcome> {
        tracing::debug!(oh_id, "Starting GitHub processing");

        let profile = self.store.exchange_token(oh_access_token).await?;
        let mut archive = self.load_existing(&profile).await?;

        let state = match self.page(oh_id, &mut archive, today).await {
            Ok(SyncState::Done { weeks_fetched }) => self
                .recorder
                .record_success(oh_id, Utc::now())
                .await
                .map(|()| SyncState::Done { weeks_fetched }),
            other => other,
        };

        // Persist on every exit path, including errors.
        let persisted = self
            .replace_archive(oh_id, oh_access_token, &archive)
            .await;

        match state {
            Ok(SyncState::Done { weeks_fetched }) => {
                persisted?;
                tracing::info!(oh_id, weeks_fetched, "Successfully finished update");
                Ok(SyncOutcome::Completed {
                    weeks_fetched,
                    records: archive.len(),
                })
            }
            Ok(SyncState::RateLimited { weeks_fetched }) => {
                let delay = self.settings.retry_delay;
                if let Err(e) = self.scheduler.enqueue_sync(oh_id, delay).await {
                    if let Err(persist_err) = &persisted {
                        tracing::error!(oh_id, error = %persist_err, "Failed to store archive before requeue");
                    }
                    return Err(e);
                }
                tracing::debug!(
                    oh_id,
                    delay_secs = delay.as_secs(),
                    "Requeued processing after rate limit"
                );
                persisted?;
                Ok(SyncOutcome::Rescheduled {
                    weeks_fetched,
                    records: archive.len(),
                    delay,
                })
            }
            Ok(SyncState::Fetching { .. }) => Err(AppError::Internal(anyhow::anyhow!(
                "paging loop exited while still fetching"
            ))),
            Err(e) => {
                if let Err(persist_err) = persisted {
                    tracing::error!(oh_id, error = %persist_err, "Failed to store archive after sync error");
                }
                Err(e)
            }
        }
    }

    /// Weekly paging loop. Leaves the merged archive in `archive` and returns
    /// the terminal state.
    async fn page(
        &self,
        oh_id: &str,
        archive: &mut ActivityArchive,
        today: NaiveDate,
    ) -> Result<SyncState> {
        let cursor = match self.resume_cursor(archive).await {
            Ok(cursor) => cursor,
            Err(e) if e.is_rate_limited() => {
                tracing::info!(oh_id, "Rate limited before first week");
                return Ok(SyncState::RateLimited { weeks_fetched: 0 });
            }
            Err(e) => return Err(e),
        };
        *archive = prune_partial_week(std::mem::take(archive), cursor.week());

        let horizon = horizon_week(today);
        tracing::debug!(oh_id, start = %cursor.week(), horizon = %horizon, "Resuming sync");

        let mut state = SyncState::Fetching {
            cursor,
            weeks_fetched: 0,
        };

        while let SyncState::Fetching {
            cursor,
            weeks_fetched,
        } = state
        {
            let week = cursor.week();
            if week >= horizon {
                state = SyncState::Done { weeks_fetched };
                continue;
            }

            tracing::info!(oh_id, week = %week, "Processing week");
            state = match self.fetch_week(week).await {
                Ok(records) => {
                    archive.extend(records);
                    SyncState::Fetching {
                        cursor: cursor.advance(),
                        weeks_fetched: weeks_fetched + 1,
                    }
                }
                Err(e) if e.is_rate_limited() => SyncState::RateLimited { weeks_fetched },
                Err(e) => return Err(e),
            };
        }

        Ok(state)
    }

    /// Resume cursor, looking up the account creation date only when the
    /// archive is empty.
    async fn resume_cursor(&self, archive: &ActivityArchive) -> Result<SyncCursor> {
        let account_created = if archive.is_empty() {
            let profile = self
                .fetcher
                .get(
                    &account_url(&self.settings.github_api_base),
                    &self.settings.github_realm,
                    true,
                )
                .await?;
            Some(account_creation_date(&profile)?)
        } else {
            None
        };

        determine_start(archive, account_created)
    }

    async fn fetch_week(&self, week: IsoWeek) -> Result<Vec<ActivityRecord>> {
        let url = feed_week_url(&self.settings.github_api_base, week);
        let body = self
            .fetcher
            .get(&url, &self.settings.github_realm, false)
            .await?;
        records_from_response(body)
    }

    /// Download and parse the member's existing archive, if any.
    pub async fn load_existing(&self, profile: &MemberProfile) -> Result<ActivityArchive> {
        let Some(file) = find_archive_file(profile, &self.settings.marker_tag) else {
            return Ok(ActivityArchive::default());
        };

        let bytes = self.store.download(&file.download_url).await?;
        ActivityArchive::from_json_slice(&bytes)
    }

    /// Delete the previous file and upload the full archive.
    pub async fn replace_archive(
        &self,
        oh_id: &str,
        oh_access_token: &str,
        archive: &ActivityArchive,
    ) -> Result<()> {
        match self
            .store
            .delete_file(oh_access_token, oh_id, &self.settings.delete_basename)
            .await
        {
            Ok(()) | Err(AppError::NotFound(_)) => {
                tracing::debug!(oh_id, "Deleted old file");
            }
            Err(e) => return Err(e),
        }

        let contents = archive.to_json_vec()?;
        let metadata = FileMetadata {
            description: self.settings.description.clone(),
            tags: self.settings.tags.clone(),
            updated_at: Some(format_utc_rfc3339(Utc::now())),
        };

        self.store
            .upload(
                &self.settings.upload_basename,
                contents,
                &metadata,
                oh_access_token,
                oh_id,
            )
            .await?;

        tracing::debug!(oh_id, records = archive.len(), "Uploaded new file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::format_record_date;
    use chrono::Weekday;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const OH_ID: &str = "12345678";
    const TOKEN: &str = "oh-token";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(day: &str) -> ActivityRecord {
        serde_json::from_value(json!({"date": day, "events": []})).unwrap()
    }

    fn weeks(archive: &ActivityArchive) -> Vec<IsoWeek> {
        archive.records().iter().map(|r| r.week().unwrap()).collect()
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            github_api_base: "https://api.test".to_string(),
            ..SyncSettings::default()
        }
    }

    // ─── Fakes ───────────────────────────────────────────────────

    #[derive(Default)]
    struct FetcherState {
        created_at: Option<String>,
        account_rate_limited: bool,
        rate_limit_after: Option<usize>,
        fail_after: Option<usize>,
        week_calls: usize,
        urls: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct FakeFetcher(Arc<Mutex<FetcherState>>);

    impl FakeFetcher {
        fn created(created_at: &str) -> Self {
            let fetcher = Self::default();
            fetcher.0.lock().unwrap().created_at = Some(created_at.to_string());
            fetcher
        }

        fn account_rate_limited(self) -> Self {
            self.0.lock().unwrap().account_rate_limited = true;
            self
        }

        fn rate_limit_after(self, n: usize) -> Self {
            self.0.lock().unwrap().rate_limit_after = Some(n);
            self
        }

        fn fail_after(self, n: usize) -> Self {
            self.0.lock().unwrap().fail_after = Some(n);
            self
        }

        fn urls(&self) -> Vec<String> {
            self.0.lock().unwrap().urls.clone()
        }
    }

    fn week_from_url(url: &str) -> IsoWeek {
        let spec = url
            .split("/feeds/")
            .nth(1)
            .and_then(|rest| rest.split('?').next())
            .unwrap();
        let (year, week) = spec.split_once("-W").unwrap();
        IsoWeek::new(year.parse().unwrap(), week.parse().unwrap())
    }

    #[async_trait]
    impl ActivityFetcher for FakeFetcher {
        async fn get(&self, url: &str, realm: &str, wait: bool) -> Result<Value> {
            let mut state = self.0.lock().unwrap();
            state.urls.push(url.to_string());

            if url.ends_with("/user") {
                assert!(wait, "account lookup should wait for budget");
                if state.account_rate_limited {
                    return Err(AppError::rate_limited(realm));
                }
                return Ok(match &state.created_at {
                    Some(created_at) => json!({"created_at": created_at}),
                    None => json!({"login": "octocat"}),
                });
            }

            if state.rate_limit_after.is_some_and(|n| state.week_calls >= n) {
                return Err(AppError::rate_limited(realm));
            }
            if state.fail_after.is_some_and(|n| state.week_calls >= n) {
                return Err(AppError::GitHubApi("HTTP 500: boom".to_string()));
            }
            state.week_calls += 1;

            let week = week_from_url(url);
            let monday = NaiveDate::from_isoywd_opt(week.year, week.week, Weekday::Mon).unwrap();
            Ok(json!([{"date": format_record_date(monday), "events": [week.to_string()]}]))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum StoreOp {
        Exchange,
        Download(String),
        Delete(String),
        Upload(String),
    }

    #[derive(Default)]
    struct StoreState {
        files: Vec<(RemoteFile, Vec<u8>)>,
        delete_not_found: bool,
        fail_upload: bool,
        ops: Vec<StoreOp>,
        uploads: Vec<(Vec<u8>, FileMetadata)>,
    }

    #[derive(Clone, Default)]
    struct FakeStore(Arc<Mutex<StoreState>>);

    impl FakeStore {
        fn with_file(self, url: &str, tags: &[&str], contents: &[u8]) -> Self {
            let file = RemoteFile {
                basename: "github-data.json".to_string(),
                download_url: url.to_string(),
                metadata: FileMetadata {
                    description: String::new(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    updated_at: None,
                },
            };
            self.0.lock().unwrap().files.push((file, contents.to_vec()));
            self
        }

        fn with_archive(self, archive: &ActivityArchive) -> Self {
            self.with_file("https://store/github", &["Github"], &archive.to_json_vec().unwrap())
        }

        fn ops(&self) -> Vec<StoreOp> {
            self.0.lock().unwrap().ops.clone()
        }

        fn last_upload(&self) -> (ActivityArchive, FileMetadata) {
            let state = self.0.lock().unwrap();
            let (bytes, metadata) = state.uploads.last().expect("no upload").clone();
            (ActivityArchive::from_json_slice(&bytes).unwrap(), metadata)
        }

        fn upload_count(&self) -> usize {
            self.0.lock().unwrap().uploads.len()
        }
    }

    #[async_trait]
    impl ArchiveStore for FakeStore {
        async fn exchange_token(&self, access_token: &str) -> Result<MemberProfile> {
            assert_eq!(access_token, TOKEN);
            let mut state = self.0.lock().unwrap();
            state.ops.push(StoreOp::Exchange);
            Ok(MemberProfile {
                project_member_id: OH_ID.to_string(),
                files: state.files.iter().map(|(f, _)| f.clone()).collect(),
            })
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            let mut state = self.0.lock().unwrap();
            state.ops.push(StoreOp::Download(url.to_string()));
            state
                .files
                .iter()
                .find(|(f, _)| f.download_url == url)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| AppError::NotFound(url.to_string()))
        }

        async fn delete_file(
            &self,
            _access_token: &str,
            member_id: &str,
            file_basename: &str,
        ) -> Result<()> {
            assert_eq!(member_id, OH_ID);
            let mut state = self.0.lock().unwrap();
            state.ops.push(StoreOp::Delete(file_basename.to_string()));
            if state.delete_not_found {
                return Err(AppError::NotFound(file_basename.to_string()));
            }
            state.files.retain(|(f, _)| f.basename != file_basename);
            Ok(())
        }

        async fn upload(
            &self,
            basename: &str,
            contents: Vec<u8>,
            metadata: &FileMetadata,
            _access_token: &str,
            member_id: &str,
        ) -> Result<()> {
            assert_eq!(member_id, OH_ID);
            let mut state = self.0.lock().unwrap();
            state.ops.push(StoreOp::Upload(basename.to_string()));
            if state.fail_upload {
                return Err(AppError::OpenHumansApi("HTTP 503: unavailable".to_string()));
            }
            state.uploads.push((contents.clone(), metadata.clone()));
            // Behave like the real store: the new file replaces the listing entry.
            state.files.retain(|(f, _)| f.basename != basename);
            state.files.push((
                RemoteFile {
                    basename: basename.to_string(),
                    download_url: format!("https://store/{}", basename),
                    metadata: metadata.clone(),
                },
                contents,
            ));
            Ok(())
        }
    }

    /// Records enqueues; fails every call when the flag is set.
    #[derive(Clone, Default)]
    struct FakeScheduler(Arc<Mutex<Vec<(String, Duration)>>>, bool);

    #[async_trait]
    impl SyncScheduler for FakeScheduler {
        async fn enqueue_sync(&self, oh_id: &str, delay: Duration) -> Result<()> {
            self.0.lock().unwrap().push((oh_id.to_string(), delay));
            if self.1 {
                return Err(AppError::Internal(anyhow::anyhow!("queue unavailable")));
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeRecorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl SyncRecorder for FakeRecorder {
        async fn record_success(&self, oh_id: &str, _at: DateTime<Utc>) -> Result<()> {
            self.0.lock().unwrap().push(oh_id.to_string());
            Ok(())
        }
    }

    struct Harness {
        fetcher: FakeFetcher,
        store: FakeStore,
        scheduler: FakeScheduler,
        recorder: FakeRecorder,
    }

    impl Harness {
        fn new(fetcher: FakeFetcher, store: FakeStore) -> Self {
            Self {
                fetcher,
                store,
                scheduler: FakeScheduler::default(),
                recorder: FakeRecorder::default(),
            }
        }

        fn failing_scheduler(mut self) -> Self {
            self.scheduler.1 = true;
            self
        }

        fn engine(&self) -> SyncEngine<FakeFetcher, FakeStore, FakeScheduler, FakeRecorder> {
            SyncEngine::new(
                self.fetcher.clone(),
                self.store.clone(),
                self.scheduler.clone(),
                self.recorder.clone(),
                settings(),
            )
        }

        async fn run(&self, today: NaiveDate) -> Result<SyncOutcome> {
            self.engine().sync_at(OH_ID, TOKEN, today).await
        }

        fn scheduled(&self) -> Vec<(String, Duration)> {
            self.scheduler.0.lock().unwrap().clone()
        }

        fn recorded(&self) -> Vec<String> {
            self.recorder.0.lock().unwrap().clone()
        }
    }

    // ─── Pure helpers ────────────────────────────────────────────

    #[test]
    fn determine_start_uses_last_record() {
        let archive = ActivityArchive::new(vec![record("20230102"), record("20230109")]);
        let cursor = determine_start(&archive, None).unwrap();
        assert_eq!(cursor.date, date(2023, 1, 9));
        assert_eq!(cursor.week(), IsoWeek::new(2023, 2));
    }

    #[test]
    fn determine_start_empty_uses_creation_date() {
        let cursor = determine_start(&ActivityArchive::default(), Some(date(2023, 1, 2))).unwrap();
        assert_eq!(cursor.week(), IsoWeek::new(2023, 1));
    }

    #[test]
    fn determine_start_empty_without_creation_date_fails() {
        let err = determine_start(&ActivityArchive::default(), None).unwrap_err();
        assert!(matches!(err, AppError::InvalidData(_)));
    }

    #[test]
    fn prune_removes_every_match_and_keeps_order() {
        let archive = ActivityArchive::new(vec![
            record("20230103"),
            record("20230110"),
            record("20230105"),
            record("20230117"),
        ]);

        let pruned = prune_partial_week(archive, IsoWeek::new(2023, 1));

        let dates: Vec<_> = pruned.records().iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["20230110", "20230117"]);
    }

    #[test]
    fn prune_without_match_is_identity() {
        let archive = ActivityArchive::new(vec![record("20230103"), record("20230110")]);
        let pruned = prune_partial_week(archive.clone(), IsoWeek::new(2022, 40));
        assert_eq!(pruned, archive);
    }

    #[test]
    fn cursor_advances_across_year_boundary() {
        let cursor = SyncCursor::new(date(2022, 12, 26));
        assert_eq!(cursor.week(), IsoWeek::new(2022, 52));
        assert_eq!(cursor.advance().week(), IsoWeek::new(2023, 1));
    }

    #[test]
    fn horizon_is_one_week_ahead() {
        assert_eq!(horizon_week(date(2023, 1, 9)), IsoWeek::new(2023, 3));
    }

    #[test]
    fn find_archive_file_takes_first_tagged() {
        let tagged = |url: &str, tags: &[&str]| RemoteFile {
            basename: "x.json".to_string(),
            download_url: url.to_string(),
            metadata: FileMetadata {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..FileMetadata::default()
            },
        };
        let profile = MemberProfile {
            project_member_id: OH_ID.to_string(),
            files: vec![
                tagged("a", &["demo"]),
                tagged("b", &["Github", "activity"]),
                tagged("c", &["Github"]),
            ],
        };

        let file = find_archive_file(&profile, "Github").unwrap();
        assert_eq!(file.download_url, "b");
        assert!(find_archive_file(&profile, "Moves").is_none());
    }

    // ─── Engine ──────────────────────────────────────────────────

    #[tokio::test]
    async fn bootstrap_from_empty_archive() {
        let harness = Harness::new(
            FakeFetcher::created("2023-01-02T08:00:00Z"),
            FakeStore::default(),
        );

        let outcome = harness.run(date(2023, 1, 9)).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Completed {
                weeks_fetched: 2,
                records: 2
            }
        );
        let (archive, _) = harness.store.last_upload();
        assert_eq!(
            weeks(&archive),
            vec![IsoWeek::new(2023, 1), IsoWeek::new(2023, 2)]
        );
        assert_eq!(
            harness.fetcher.urls(),
            vec![
                "https://api.test/user",
                "https://api.test/feeds/2023-W1?trackPoints=true",
                "https://api.test/feeds/2023-W2?trackPoints=true",
            ]
        );
        assert_eq!(harness.recorded(), vec![OH_ID.to_string()]);
        assert!(harness.scheduled().is_empty());
    }

    #[tokio::test]
    async fn non_empty_archive_skips_account_lookup() {
        let existing = ActivityArchive::new(vec![record("20230102")]);
        let harness = Harness::new(
            FakeFetcher::default(),
            FakeStore::default().with_archive(&existing),
        );

        harness.run(date(2023, 1, 9)).await.unwrap();

        assert!(harness
            .fetcher
            .urls()
            .iter()
            .all(|url| !url.ends_with("/user")));
    }

    #[tokio::test]
    async fn resume_replaces_partial_week() {
        let mut partial = record("20230109");
        partial.payload.insert("partial".to_string(), json!(true));
        let existing = ActivityArchive::new(vec![record("20230102"), partial]);
        let harness = Harness::new(
            FakeFetcher::default(),
            FakeStore::default().with_archive(&existing),
        );

        let outcome = harness.run(date(2023, 1, 16)).await.unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::Completed {
                weeks_fetched: 2,
                records: 3
            }
        ));
        let (archive, _) = harness.store.last_upload();
        assert_eq!(
            weeks(&archive),
            vec![
                IsoWeek::new(2023, 1),
                IsoWeek::new(2023, 2),
                IsoWeek::new(2023, 3)
            ]
        );
        assert!(archive
            .records()
            .iter()
            .all(|r| !r.payload.contains_key("partial")));
    }

    #[tokio::test]
    async fn repeated_runs_never_duplicate_weeks() {
        let harness = Harness::new(
            FakeFetcher::created("2023-01-02T08:00:00Z"),
            FakeStore::default(),
        );

        for _ in 0..3 {
            harness.run(date(2023, 1, 9)).await.unwrap();
        }

        let (archive, _) = harness.store.last_upload();
        assert_eq!(
            weeks(&archive),
            vec![IsoWeek::new(2023, 1), IsoWeek::new(2023, 2)]
        );
    }

    #[tokio::test]
    async fn coverage_is_contiguous_across_year_end() {
        let existing = ActivityArchive::new(vec![record("20221212")]);
        let harness = Harness::new(
            FakeFetcher::default(),
            FakeStore::default().with_archive(&existing),
        );

        harness.run(date(2023, 1, 10)).await.unwrap();

        let (archive, _) = harness.store.last_upload();
        assert_eq!(
            weeks(&archive),
            vec![
                IsoWeek::new(2022, 50),
                IsoWeek::new(2022, 51),
                IsoWeek::new(2022, 52),
                IsoWeek::new(2023, 1),
                IsoWeek::new(2023, 2),
            ]
        );
    }

    #[tokio::test]
    async fn rate_limit_persists_progress_and_reschedules_once() {
        let existing = ActivityArchive::new(vec![record("20221226")]);
        let harness = Harness::new(
            FakeFetcher::default().rate_limit_after(2),
            FakeStore::default().with_archive(&existing),
        );

        let outcome = harness.run(date(2023, 2, 1)).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Rescheduled {
                weeks_fetched: 2,
                records: 2,
                delay: Duration::from_secs(61)
            }
        );
        let (archive, _) = harness.store.last_upload();
        assert_eq!(
            weeks(&archive),
            vec![IsoWeek::new(2022, 52), IsoWeek::new(2023, 1)]
        );
        assert_eq!(
            harness.scheduled(),
            vec![(OH_ID.to_string(), Duration::from_secs(61))]
        );
        assert!(harness.recorded().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_on_first_week_keeps_existing_data() {
        let existing = ActivityArchive::new(vec![record("20221219"), record("20221226")]);
        let harness = Harness::new(
            FakeFetcher::default().rate_limit_after(0),
            FakeStore::default().with_archive(&existing),
        );

        harness.run(date(2023, 2, 1)).await.unwrap();

        // The resume week is pruned before the first fetch and refetched next time.
        let (archive, _) = harness.store.last_upload();
        assert_eq!(weeks(&archive), vec![IsoWeek::new(2022, 51)]);
        assert_eq!(harness.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn rate_limited_account_lookup_is_rescheduled() {
        let harness = Harness::new(
            FakeFetcher::created("2023-01-02T08:00:00Z").account_rate_limited(),
            FakeStore::default(),
        );

        let outcome = harness.run(date(2023, 2, 1)).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Rescheduled {
                weeks_fetched: 0,
                records: 0,
                delay: Duration::from_secs(61)
            }
        );
        assert_eq!(
            harness.scheduled(),
            vec![(OH_ID.to_string(), Duration::from_secs(61))]
        );
        assert_eq!(harness.fetcher.urls(), vec!["https://api.test/user".to_string()]);
        assert_eq!(harness.store.upload_count(), 1);
        assert!(harness.recorded().is_empty());
    }

    #[tokio::test]
    async fn failed_requeue_is_returned_even_when_persist_also_failed() {
        let store = FakeStore::default();
        store.0.lock().unwrap().fail_upload = true;
        let harness = Harness::new(
            FakeFetcher::created("2023-01-02T08:00:00Z").rate_limit_after(1),
            store,
        )
        .failing_scheduler();

        let err = harness.run(date(2023, 2, 1)).await.unwrap_err();

        // The enqueue error wins; the upload was still attempted first.
        assert!(matches!(err, AppError::Internal(_)));
        assert!(harness
            .store
            .ops()
            .contains(&StoreOp::Upload("github-data.json".to_string())));
        assert_eq!(harness.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn other_errors_propagate_after_persisting() {
        let harness = Harness::new(
            FakeFetcher::created("2023-01-02T08:00:00Z").fail_after(1),
            FakeStore::default(),
        );

        let err = harness.run(date(2023, 2, 1)).await.unwrap_err();

        assert!(matches!(err, AppError::GitHubApi(_)));
        let (archive, _) = harness.store.last_upload();
        assert_eq!(weeks(&archive), vec![IsoWeek::new(2023, 1)]);
        assert!(harness.scheduled().is_empty());
        assert!(harness.recorded().is_empty());
    }

    #[tokio::test]
    async fn missing_creation_date_fails_but_still_uploads() {
        let harness = Harness::new(FakeFetcher::default(), FakeStore::default());

        let err = harness.run(date(2023, 1, 9)).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidData(_)));
        let (archive, _) = harness.store.last_upload();
        assert!(archive.is_empty());
    }

    #[tokio::test]
    async fn cursor_at_horizon_fetches_nothing() {
        let existing = ActivityArchive::new(vec![record("20230116")]);
        let harness = Harness::new(
            FakeFetcher::default(),
            FakeStore::default().with_archive(&existing),
        );

        let outcome = harness.run(date(2023, 1, 9)).await.unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::Completed {
                weeks_fetched: 0,
                ..
            }
        ));
        assert!(harness.fetcher.urls().is_empty());
        assert_eq!(harness.recorded().len(), 1);
    }

    #[tokio::test]
    async fn load_existing_ignores_untagged_files() {
        let store = FakeStore::default()
            .with_file("https://store/other", &["demo"], b"not json")
            .with_file("https://store/first", &["Github"], br#"[{"date": "20230102"}]"#)
            .with_file("https://store/second", &["Github"], br#"[{"date": "20230109"}]"#);
        let harness = Harness::new(FakeFetcher::default(), store);
        let profile = harness.store.exchange_token(TOKEN).await.unwrap();

        let archive = harness.engine().load_existing(&profile).await.unwrap();

        assert_eq!(archive.len(), 1);
        assert_eq!(archive.records()[0].date, "20230102");
        assert!(harness
            .store
            .ops()
            .contains(&StoreOp::Download("https://store/first".to_string())));
    }

    #[tokio::test]
    async fn load_existing_without_match_is_empty() {
        let harness = Harness::new(FakeFetcher::default(), FakeStore::default());
        let profile = MemberProfile::default();

        let archive = harness.engine().load_existing(&profile).await.unwrap();

        assert!(archive.is_empty());
        assert!(harness.store.ops().is_empty());
    }

    #[tokio::test]
    async fn replace_deletes_then_uploads_even_when_nothing_to_delete() {
        let store = FakeStore::default();
        store.0.lock().unwrap().delete_not_found = true;
        let harness = Harness::new(FakeFetcher::default(), store);

        harness
            .engine()
            .replace_archive(OH_ID, TOKEN, &ActivityArchive::default())
            .await
            .unwrap();

        assert_eq!(
            harness.store.ops(),
            vec![
                StoreOp::Delete("dummy-data.json".to_string()),
                StoreOp::Upload("github-data.json".to_string()),
            ]
        );
        let (archive, metadata) = harness.store.last_upload();
        assert!(archive.is_empty());
        assert!(metadata.tags.contains(&"Github".to_string()));
        assert!(metadata.updated_at.is_some());
        assert_eq!(harness.store.upload_count(), 1);
    }

    #[tokio::test]
    async fn full_sync_order_is_exchange_delete_upload() {
        let harness = Harness::new(
            FakeFetcher::created("2023-01-02T08:00:00Z"),
            FakeStore::default(),
        );

        harness.run(date(2023, 1, 9)).await.unwrap();

        assert_eq!(
            harness.store.ops(),
            vec![
                StoreOp::Exchange,
                StoreOp::Delete("dummy-data.json".to_string()),
                StoreOp::Upload("github-data.json".to_string()),
            ]
        );
    }
}
