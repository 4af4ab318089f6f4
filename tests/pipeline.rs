use std::fs;
use std::path::{Path, PathBuf};

use docqa::config::{Config, EmbeddingBackend, LlmBackend};
use docqa::document;
use docqa::rag::prompt::NOT_FOUND_REPLY;
use docqa::rag::Assistant;

const BIOLOGY: &str = "Photosynthesis converts sunlight into chemical energy. \
Plants use sunlight, water and carbon dioxide.";

fn offline_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.store_path = root.join("store").join("index.json");
    config.paths.data_dir = root.join("data");
    config.embedding.backend = EmbeddingBackend::Hash;
    config.embedding.dimension = 512;
    config.llm.backend = LlmBackend::Stub;
    config
}

#[tokio::test]
async fn ingest_then_answer_with_sources() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let upload = dir.path().join("biology.txt");
    fs::write(&upload, BIOLOGY).unwrap();

    let staged = document::stage_upload(&upload, &config.paths.data_dir).unwrap();
    let mut assistant = Assistant::from_config(&config).await.unwrap();
    let report = assistant.process_and_store(&staged).await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);

    let answer = assistant.answer_question("photosynthesis sunlight chemical energy").await.unwrap();
    assert!(answer.text.starts_with("LLM(stub) response"), "got {:?}", answer.text);
    assert!(answer.text.ends_with("\n\n**Sources:** biology.txt"));
    assert_eq!(answer.sources, vec!["biology.txt".to_string()]);
}

#[tokio::test]
async fn unrelated_question_is_gated() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let path = dir.path().join("biology.txt");
    fs::write(&path, BIOLOGY).unwrap();

    let mut assistant = Assistant::from_config(&config).await.unwrap();
    assistant.process_and_store(&path).await.unwrap();

    let answer = assistant.answer_question("medieval castle tournament knights").await.unwrap();
    assert_eq!(answer.text, NOT_FOUND_REPLY);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn store_persists_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let first = dir.path().join("first.txt");
    let second = dir.path().join("second.md");
    fs::write(&first, BIOLOGY).unwrap();
    fs::write(&second, "# Rivers\n\nThe Nile flows north into the Mediterranean.").unwrap();

    {
        let mut assistant = Assistant::from_config(&config).await.unwrap();
        assistant.process_and_store(&first).await.unwrap();
        assistant.process_and_store(&second).await.unwrap();
    }

    let reopened = Assistant::from_config(&config).await.unwrap();
    assert_eq!(reopened.store().len().await.unwrap(), 2);
    assert_eq!(reopened.store().sources().await.unwrap(), vec![first, second]);
    // Both chunks fit in the context window, so both files are cited.
    let answer = reopened.answer_question("Nile flows north").await.unwrap();
    assert_eq!(answer.sources, vec!["first.txt".to_string(), "second.md".to_string()]);
}

#[tokio::test]
async fn rebuild_replaces_store_with_matching_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = offline_config(dir.path());
    config.rebuild.chunk_size = 60;
    config.rebuild.chunk_overlap = 10;

    let stale = dir.path().join("stale.txt");
    fs::write(&stale, "Outdated notes about tax forms.").unwrap();
    let corpus = dir.path().join("corpus");
    fs::create_dir_all(corpus.join("nested")).unwrap();
    fs::write(corpus.join("a.md"), "Alpha section one.\n\nAlpha section two has more words in it.").unwrap();
    fs::write(corpus.join("b.md"), "Beta sits next to alpha.").unwrap();
    fs::write(corpus.join("nested").join("deep.md"), "Deep files are left out of a rebuild.").unwrap();
    fs::write(corpus.join("ignored.txt"), "Plain text is not part of the rebuild.").unwrap();

    let mut assistant = Assistant::from_config(&config).await.unwrap();
    assistant.process_and_store(&stale).await.unwrap();

    let (report, chunks) = assistant.rebuild(&corpus).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.chunks, chunks.len());
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 60));
    assert!(chunks.iter().all(|c| c.start_index.is_some()));

    let mut sources = assistant.store().sources().await.unwrap();
    sources.sort();
    let mut expected: Vec<PathBuf> = vec![corpus.join("a.md"), corpus.join("b.md")];
    expected.sort();
    assert_eq!(sources, expected);
}

#[tokio::test]
async fn small_talk_needs_no_index() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = Assistant::from_config(&offline_config(dir.path())).await.unwrap();
    let answer = assistant.answer_question("Who are you?").await.unwrap();
    assert_eq!(answer.text, "I\u{2019}m a document assistant built to answer questions based on uploaded files.");
    assert!(!dir.path().join("store").exists());
}

#[tokio::test]
async fn empty_document_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let path = dir.path().join("blank.txt");
    fs::write(&path, "   \n\n  ").unwrap();

    let mut assistant = Assistant::from_config(&config).await.unwrap();
    let report = assistant.process_and_store(&path).await.unwrap();
    assert_eq!(report.chunks, 0);
    assert!(assistant.store().is_empty().await.unwrap());
}
