//! Prescription commands: registration of family members and the two
//! prescription upload flows.

use std::sync::Arc;

use crate::core_state::{CoreError, CoreState};
use crate::models::{MealTimes, MemberRecord};
use crate::pipeline::reconcile::ReconcileReport;

/// Run blocking work for `state` on the blocking pool.
async fn run_blocking<T, F>(state: Arc<CoreState>, work: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce(&CoreState) -> Result<T, CoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| CoreError::TaskJoin(e.to_string()))?
}

/// Create the user's entry in the schedule file. Existing users are kept.
pub async fn register_user(state: Arc<CoreState>, user_key: String) -> Result<bool, CoreError> {
    run_blocking(state, move |state| Ok(state.schedule().add_user(&user_key)?)).await
}

/// Register a family member in both stores and return the member id the
/// prescription flows expect.
pub async fn register_family_member(
    state: Arc<CoreState>,
    user_key: String,
    name: String,
    dob: String,
    meal_times: MealTimes,
) -> Result<String, CoreError> {
    run_blocking(state, move |state| {
        if !state
            .schedule()
            .add_family_member(&user_key, &name, &dob, meal_times)?
        {
            return Err(CoreError::UnknownUser(user_key));
        }
        let member = state.documents().insert_member(&user_key, &name, Some(&dob))?;
        tracing::info!(user = %user_key, member = %name, member_id = %member.id, "Family member registered");
        Ok(member.id)
    })
    .await
}

/// Family members registered under `user_key`, with the ids the
/// prescription flows take.
pub async fn list_family_members(
    state: Arc<CoreState>,
    user_key: String,
) -> Result<Vec<MemberRecord>, CoreError> {
    run_blocking(state, move |state| Ok(state.documents().members_for_user(&user_key)?)).await
}

/// Process a photographed prescription for `member_id`.
pub async fn process_image_prescription(
    state: Arc<CoreState>,
    user_key: String,
    member_id: String,
    image_bytes: Vec<u8>,
) -> Result<ReconcileReport, CoreError> {
    run_blocking(state, move |state| {
        Ok(state
            .processor()
            .process_image_prescription(&user_key, &member_id, &image_bytes)?)
    })
    .await
}

/// Process a dictated prescription transcript for `member_id`.
pub async fn process_audio_prescription(
    state: Arc<CoreState>,
    user_key: String,
    member_id: String,
    transcript: String,
) -> Result<ReconcileReport, CoreError> {
    run_blocking(state, move |state| {
        Ok(state
            .processor()
            .process_audio_prescription(&user_key, &member_id, &transcript)?)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::SqliteDocumentStore;
    use crate::pipeline::extraction::ocr::MockOcrEngine;
    use crate::pipeline::extraction::orchestrator::PrescriptionTextExtractor;
    use crate::pipeline::extraction::preprocess::MockImagePreprocessor;
    use crate::pipeline::processor::{ErrorKind, PrescriptionProcessor};
    use crate::pipeline::structuring::ollama::MockLlmClient;
    use crate::pipeline::structuring::ollama_types::GenerationOptions;
    use crate::pipeline::structuring::parser::StructuredParser;
    use crate::schedule_store::ScheduleStore;

    const USER: &str = "a@x.com";

    fn mock_state(dir: &tempfile::TempDir, llm_reply: &str, ocr: &[&str]) -> Arc<CoreState> {
        let config = PipelineConfig {
            schedule_path: dir.path().join("schedule.json"),
            database_path: dir.path().join("medimitra.db"),
            ..PipelineConfig::default()
        };
        let schedule = Arc::new(ScheduleStore::new(config.schedule_path.clone()));
        let documents = Arc::new(SqliteDocumentStore::open(&config.database_path).unwrap());
        let extractor = PrescriptionTextExtractor::new(
            Box::new(MockImagePreprocessor::new()),
            Box::new(MockOcrEngine::new(ocr)),
        );
        let processor = PrescriptionProcessor::new(
            Box::new(extractor),
            StructuredParser::new(
                Arc::new(MockLlmClient::new(llm_reply)),
                "medgemma",
                GenerationOptions::default(),
            ),
            schedule.clone(),
            documents.clone(),
            documents.clone(),
        );
        Arc::new(CoreState::with_processor(config, schedule, documents, processor))
    }

    async fn register_alice(state: &Arc<CoreState>) -> String {
        register_user(state.clone(), USER.into()).await.unwrap();
        register_family_member(
            state.clone(),
            USER.into(),
            "Alice".into(),
            "1990-04-12".into(),
            MealTimes::new("08:00", "13:00", "20:00"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn image_flow_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"medicines":[{"name":"Paracetamol","dosage":"500mg","times":["08:00","20:00"]}],"duration":"5 days","advice":"","follow_up":""}"#;
        let state = mock_state(&dir, reply, &["Paracetamol 500mg", "BD"]);
        let alice_id = register_alice(&state).await;

        let report = process_image_prescription(state.clone(), USER.into(), alice_id.clone(), b"img".to_vec())
            .await
            .unwrap();

        assert_eq!(report.accepted, vec!["Paracetamol"]);
        let ledger = state.documents().medicines_for_member(&alice_id).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].times, vec!["08:00", "20:00"]);
    }

    #[tokio::test]
    async fn audio_flow_reports_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"medicines":[
            {"name":"Amoxicillin","dosage":"250mg","times":["08:00"]},
            {"name":"Cetirizine","dosage":"10mg","times":["9:30"]}
        ]}"#;
        let state = mock_state(&dir, reply, &[]);
        let alice_id = register_alice(&state).await;

        let report = process_audio_prescription(
            state.clone(),
            USER.into(),
            alice_id,
            "Amoxicillin 250 in the morning, cetirizine at nine thirty".into(),
        )
        .await
        .unwrap();

        assert_eq!(report.accepted, vec!["Amoxicillin"]);
        assert_eq!(report.rejected.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_keep_every_medicine() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(&dir, "{}", &[]);
        register_alice(&state).await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                run_blocking(state.clone(), move |state| {
                    state.schedule().upsert_schedule(
                        USER,
                        "Alice",
                        &format!("Medicine {i}"),
                        "1 tab",
                        &["08:00".to_string()],
                    )?;
                    Ok(())
                })
            })
            .map(tokio::spawn)
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let alice = state.schedule().family_member(USER, "Alice").unwrap().unwrap();
        assert_eq!(alice.schedules.len(), 8);
    }

    #[tokio::test]
    async fn unknown_member_surfaces_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(&dir, "{}", &[]);

        let err = process_audio_prescription(state, USER.into(), "missing".into(), "x".into())
            .await
            .unwrap_err();

        match err {
            CoreError::Processing(e) => assert_eq!(e.kind(), ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn registered_member_is_listed_with_its_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(&dir, "{}", &[]);
        let member_id = register_alice(&state).await;

        let members = list_family_members(state, USER.into()).await.unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, member_id);
        assert_eq!(members[0].name, "Alice");
        assert_eq!(members[0].dob.as_deref(), Some("1990-04-12"));
    }

    #[tokio::test]
    async fn family_member_needs_registered_user() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(&dir, "{}", &[]);

        let err = register_family_member(
            state.clone(),
            "nobody@x.com".into(),
            "Bob".into(),
            "2001-01-01".into(),
            MealTimes::new("07:00", "12:00", "19:00"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CoreError::UnknownUser(_)));
        let members = list_family_members(state, "nobody@x.com".into()).await.unwrap();
        assert!(members.is_empty());
    }
}
