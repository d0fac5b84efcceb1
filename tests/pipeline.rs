//! End-to-end turn tests with in-process fake providers.
//!
//! The embedder is the real offline hashing embedder; the generator is a
//! scripted fake that records every prompt it sees and can be told to fail
//! before or during streaming.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docchat::app::{self, ChatServices};
use docchat::chats::ChatDirectory;
use docchat::config::{load_config, Config};
use docchat::documents::DocumentStore;
use docchat::embedding::HashingEmbedder;
use docchat::memory::{self, ConversationMemory, LoadStatus};
use docchat::orchestrator::SessionOrchestrator;
use docchat_core::chunk::split;
use docchat_core::embedding::EmbeddingProvider;
use docchat_core::generation::{FragmentStream, Generator, Prompt};
use docchat_core::models::{ChatHistory, Role};
use docchat_core::Error;
use futures::StreamExt;
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum Failure {
    None,
    /// `generate` itself returns an error.
    AtStart,
    /// The stream yields this many fragments, then an error.
    AfterFragments(usize),
}

struct ScriptedGenerator {
    answer: String,
    failure: Mutex<Failure>,
    rewrites: Mutex<Vec<Prompt>>,
    generations: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            failure: Mutex::new(Failure::None),
            rewrites: Mutex::new(Vec::new()),
            generations: Mutex::new(Vec::new()),
        })
    }

    fn fail(&self, failure: Failure) {
        *self.failure.lock().unwrap() = failure;
    }

    fn fragments(&self) -> Vec<String> {
        self.answer
            .split_inclusive(' ')
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn rewrite(&self, prompt: &Prompt) -> docchat_core::Result<String> {
        self.rewrites.lock().unwrap().push(prompt.clone());
        Ok(format!("standalone: {}", prompt.input))
    }

    async fn generate(&self, prompt: &Prompt) -> docchat_core::Result<FragmentStream> {
        self.generations.lock().unwrap().push(prompt.clone());
        let mut items: Vec<docchat_core::Result<String>> =
            self.fragments().into_iter().map(Ok).collect();
        match *self.failure.lock().unwrap() {
            Failure::None => {}
            Failure::AtStart => return Err(Error::Generation("quota exceeded".to_string())),
            Failure::AfterFragments(n) => {
                items.truncate(n);
                items.push(Err(Error::Generation("connection reset".to_string())));
            }
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

struct Env {
    _tmp: TempDir,
    config: Config,
    store: Arc<DocumentStore>,
    generator: Arc<ScriptedGenerator>,
    services: ChatServices,
    chats: ChatDirectory,
}

fn write_config(root: &Path) -> PathBuf {
    fs::write(root.join("rewrite.txt"), "Rephrase the last question.").unwrap();
    fs::write(root.join("answer.txt"), "Context:\n{context}").unwrap();
    let content = format!(
        r#"[paths]
manifest = "{d}/files.json"
chat_histories = "{d}/chats"
registry = "{d}/chat_paths.json"
index = "{d}/index"

[prompts]
rewrite = "{d}/rewrite.txt"
answer = "{d}/answer.txt"

[retrieval]
top_k = 2

[embedding]
provider = "hashing"
dims = 256
"#,
        d = root.display()
    );
    let path = root.join("docchat.toml");
    fs::write(&path, content).unwrap();
    path
}

async fn setup(answer: &str) -> Env {
    let tmp = TempDir::new().unwrap();
    let config = load_config(&write_config(tmp.path())).unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(256));
    let store = app::open_store(&config, embedder).await.unwrap();
    store
        .add(
            "france.txt",
            &[
                "Paris is the capital of France".to_string(),
                "Lyon is famous for its cuisine".to_string(),
            ],
        )
        .await
        .unwrap();
    store
        .add("cargo.md", &["Cargo compiles crates and runs tests".to_string()])
        .await
        .unwrap();

    let generator = ScriptedGenerator::new(answer);
    let services = ChatServices::new(&config, store.clone(), generator.clone()).unwrap();
    let chats = ChatDirectory::open(&config.paths).await.unwrap();
    Env {
        _tmp: tmp,
        config,
        store,
        generator,
        services,
        chats,
    }
}

async fn session(env: &mut Env, name: &str) -> SessionOrchestrator {
    env.chats.create(name).await.unwrap();
    let (memory, status) = env.chats.open_memory(name).await.unwrap();
    assert_eq!(status, LoadStatus::Found);
    env.services.orchestrator(name, memory)
}

async fn persisted(env: &Env, name: &str) -> ChatHistory {
    let (history, _) = memory::load(env.chats.path(name).unwrap()).await.unwrap();
    history
}

#[tokio::test]
async fn test_turns_persist_alternating_pairs() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "Trip Planning").await;

    for question in ["Where is Paris?", "What about Lyon?", "And the food?"] {
        let answer = chat.ask(question).await.unwrap();
        assert_eq!(answer, "Paris is in France.");
    }

    let history = persisted(&env, "Trip Planning").await;
    assert_eq!(history.len(), 6);
    for (i, message) in history.messages().iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(message.role, expected);
    }
    assert_eq!(history.messages()[2].content, "What about Lyon?");
    assert_eq!(chat.history(), history.messages());
}

#[tokio::test]
async fn test_first_turn_skips_rewrite_and_retrieves_relevant_chunk() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "geo").await;

    chat.ask("Where is Paris?").await.unwrap();

    assert!(env.generator.rewrites.lock().unwrap().is_empty());
    let generations = env.generator.generations.lock().unwrap();
    assert_eq!(generations.len(), 1);
    assert!(
        generations[0].system.contains("Paris is the capital of France"),
        "context was: {}",
        generations[0].system
    );
    assert!(generations[0].history.is_empty());
    assert_eq!(generations[0].input, "Where is Paris?");
}

#[tokio::test]
async fn test_follow_up_is_rewritten_with_prior_history() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "geo").await;

    chat.ask("Where is Paris?").await.unwrap();
    chat.ask("How big is it?").await.unwrap();

    let rewrites = env.generator.rewrites.lock().unwrap();
    assert_eq!(rewrites.len(), 1);
    assert_eq!(rewrites[0].system, "Rephrase the last question.");
    assert_eq!(rewrites[0].history.len(), 2);
    assert_eq!(rewrites[0].input, "How big is it?");

    // The answer prompt sees the history before the new question.
    let generations = env.generator.generations.lock().unwrap();
    assert_eq!(generations[1].history.len(), 2);
    assert_eq!(generations[1].input, "How big is it?");
}

#[tokio::test]
async fn test_fragments_arrive_in_order() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "order").await;

    let fragments: Vec<String> = chat
        .run("Where is Paris?")
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(fragments, vec!["Paris ", "is ", "in ", "France."]);
    assert_eq!(chat.history().last().unwrap().content, "Paris is in France.");
}

#[tokio::test]
async fn test_generation_failure_mid_stream_keeps_only_user_message() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "flaky").await;
    chat.ask("Where is Paris?").await.unwrap();
    let before = persisted(&env, "flaky").await;

    env.generator.fail(Failure::AfterFragments(2));
    let items: Vec<_> = chat.run("And Lyon?").collect().await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_deref().unwrap(), "Paris ");
    assert!(matches!(items[2], Err(Error::Generation(_))));

    // In memory: one extra message, the question.
    assert_eq!(chat.history().len(), before.len() + 1);
    assert_eq!(chat.history().last().unwrap().role, Role::User);
    // On disk: untouched.
    assert_eq!(persisted(&env, "flaky").await, before);
}

#[tokio::test]
async fn test_generation_failure_at_start_is_surfaced() {
    let mut env = setup("unused").await;
    let mut chat = session(&mut env, "down").await;
    env.generator.fail(Failure::AtStart);

    let err = chat.ask("Where is Paris?").await.unwrap_err();
    assert!(err.is_generation_failure());
    assert_eq!(chat.history().len(), 1);
    assert!(persisted(&env, "down").await.is_empty());
}

#[tokio::test]
async fn test_dropping_stream_early_appends_nothing() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "cancel").await;

    {
        let stream = chat.run("Where is Paris?");
        futures::pin_mut!(stream);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "Paris ");
    }

    assert_eq!(chat.history().len(), 1);
    assert_eq!(chat.history()[0].role, Role::User);
    assert!(persisted(&env, "cancel").await.is_empty());
}

#[tokio::test]
async fn test_persist_failure_is_the_last_item() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "readonly").await;

    // A directory squatting on the temp name makes the atomic write fail.
    let path = env.chats.path("readonly").unwrap().to_path_buf();
    let mut tmp_name = path.file_name().unwrap().to_os_string();
    tmp_name.push(".tmp");
    fs::create_dir(path.with_file_name(tmp_name)).unwrap();

    let items: Vec<_> = chat.run("Where is Paris?").collect().await;
    let (last, fragments) = items.split_last().unwrap();
    assert!(fragments.iter().all(|f| f.is_ok()));
    assert_eq!(fragments.len(), 4);
    assert!(matches!(last, Err(e) if e.is_persistence_failure()));

    assert_eq!(chat.history().len(), 2);
    assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let mut env = setup("Paris is in France.").await;
    let mut a = session(&mut env, "a").await;
    let mut b = session(&mut env, "b").await;

    a.ask("Where is Paris?").await.unwrap();
    a.ask("Really?").await.unwrap();
    b.ask("Where is Paris?").await.unwrap();

    assert_eq!(persisted(&env, "a").await.len(), 4);
    assert_eq!(persisted(&env, "b").await.len(), 2);
}

#[tokio::test]
async fn test_reopened_session_continues_history() {
    let mut env = setup("Paris is in France.").await;
    let mut chat = session(&mut env, "resume").await;
    chat.ask("Where is Paris?").await.unwrap();
    drop(chat);

    let (memory, status) = env.chats.open_memory("resume").await.unwrap();
    assert_eq!(status, LoadStatus::Found);
    let mut chat = env.services.orchestrator("resume", memory);
    assert_eq!(chat.history().len(), 2);

    chat.ask("Tell me more").await.unwrap();
    assert_eq!(persisted(&env, "resume").await.len(), 4);
    assert_eq!(env.generator.rewrites.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_memory_roundtrip_and_missing_file() {
    let tmp = TempDir::new().unwrap();
    let mut memory = ConversationMemory::new(tmp.path());
    memory.get_or_create("s");
    memory.append("s", Role::User, "Where is Paris?").unwrap();
    memory.append("s", Role::Assistant, "In France.").unwrap();
    memory.persist("s").await.unwrap();

    let (loaded, status) = memory::load(memory.path("s").unwrap()).await.unwrap();
    assert_eq!(status, LoadStatus::Found);
    assert_eq!(&loaded, memory.history("s").unwrap());

    let (empty, status) = memory::load(&tmp.path().join("absent.json")).await.unwrap();
    assert!(empty.is_empty());
    assert_eq!(status, LoadStatus::Missing);
}

#[tokio::test]
async fn test_add_1500_chars_then_delete() {
    let env = setup("unused").await;
    let line = "x".repeat(99);
    let text = vec![line; 15].join("\n");
    assert_eq!(text.chars().count(), 1499);

    let chunks = split(
        &text,
        &env.config.chunking.separator,
        env.config.chunking.chunk_size,
        env.config.chunking.chunk_overlap,
    );
    assert!(chunks.len() >= 2);

    let before = env.store.index().len().await.unwrap();
    let ids = env.store.add("doc1", &chunks).await.unwrap();
    assert_eq!(env.store.manifest().await["doc1"].len(), chunks.len());
    assert_eq!(ids.len(), chunks.len());
    assert_eq!(env.store.index().len().await.unwrap(), before + chunks.len());

    env.store.delete(&["doc1".to_string()]).await.unwrap();
    assert!(!env.store.contains("doc1").await);
    assert_eq!(env.store.index().len().await.unwrap(), before);
}

#[tokio::test]
async fn test_duplicate_add_leaves_files_byte_identical() {
    let env = setup("unused").await;
    let manifest_before = fs::read(&env.config.paths.manifest).unwrap();
    let index_before = fs::read(env.config.paths.index.join("index.json")).unwrap();

    let err = env
        .store
        .add("france.txt", &["something new".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateDocument(_)));

    assert_eq!(fs::read(&env.config.paths.manifest).unwrap(), manifest_before);
    assert_eq!(
        fs::read(env.config.paths.index.join("index.json")).unwrap(),
        index_before
    );
}

#[tokio::test]
async fn test_add_then_delete_restores_files() {
    let env = setup("unused").await;
    let manifest_before = fs::read(&env.config.paths.manifest).unwrap();
    let index_before = fs::read(env.config.paths.index.join("index.json")).unwrap();

    env.store
        .add("temp.txt", &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    env.store.delete(&["temp.txt".to_string()]).await.unwrap();

    assert_eq!(fs::read(&env.config.paths.manifest).unwrap(), manifest_before);
    assert_eq!(
        fs::read(env.config.paths.index.join("index.json")).unwrap(),
        index_before
    );
}

#[tokio::test]
async fn test_concurrent_searches_during_add() {
    let env = setup("unused").await;
    let store = env.store.clone();
    let query = HashingEmbedder::new(256).embed_text("Paris capital");

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let chunks: Vec<String> = (0..5).map(|j| format!("filler {} {}", i, j)).collect();
                store.add(&format!("filler-{}.txt", i), &chunks).await.unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let query = query.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let hits = store.similarity_search(&query, 1).await.unwrap();
                    assert_eq!(hits[0].text, "Paris is the capital of France");
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    let manifest = store.manifest().await;
    let owned: usize = manifest.values().map(Vec::len).sum();
    assert_eq!(owned, store.index().len().await.unwrap());
}

#[tokio::test]
async fn test_chat_create_and_delete_scenario() {
    let mut env = setup("unused").await;
    let path = env.chats.create("Trip Planning").await.unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    assert_eq!(env.chats.list()[0].session_id, "Trip Planning");

    env.chats.delete("Trip Planning").await.unwrap();
    assert!(!path.exists());
    assert!(env.chats.list().is_empty());
    let registry = fs::read_to_string(&env.config.paths.registry).unwrap();
    assert!(!registry.contains("Trip Planning"));
}
