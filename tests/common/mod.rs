#![allow(dead_code)]

use std::sync::Arc;

use ankisync::{
    anki::settings::save_settings,
    config::{
        AppConfig,
        UpdateStrategy,
    },
    core::{
        AnkiSettings,
        FieldMappings,
    },
    persistence::Storage,
    AppContext,
    Router,
};
use wiremock::MockServer;

pub struct Harness {
    pub planner: MockServer,
    pub anki: MockServer,
    pub ctx: Arc<AppContext>,
    pub router: Router,
}

pub async fn harness(configured: bool, strategy: UpdateStrategy) -> Harness {
    let planner = MockServer::start().await;
    let anki = MockServer::start().await;

    let storage = Storage::in_memory();
    if configured {
        let settings = AnkiSettings {
            anki_connect_url: anki.uri(),
            deck_name: "Mining".into(),
            note_type: "Lapis".into(),
        };
        let mappings = FieldMappings::from([
            ("expression".to_string(), "Expression".to_string()),
            ("audio".to_string(), "Audio".to_string()),
        ]);
        save_settings(&storage, &settings, &mappings).await.unwrap();
    }

    let config = AppConfig {
        planner_url: planner.uri(),
        update_strategy: strategy,
        retry: ankisync::config::RetryPolicy { max_attempts: 1, base_delay_ms: 1 },
        ..AppConfig::default()
    };
    // the planner mock doubles as the Supabase project
    let project = Some((planner.uri(), "anon".to_string()));
    let ctx = AppContext::build_with(config, storage, project).await.unwrap();
    let router = Router::new(ctx.clone());

    Harness { planner, anki, ctx, router }
}
