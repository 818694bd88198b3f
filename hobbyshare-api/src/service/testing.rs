//! In-memory stores and object storage for service tests.

use async_trait::async_trait;
use bytes::Bytes;
use hobbyshare_common::{
    model::{
        Id,
        auth::{Account, CreateAccount, Email},
        post::{
            CommentCount, Post, PostContent, PostImage, PostImageMarker, PostMarker, PostSummary,
        },
        tag::{HobbyTag, HobbyTagMarker},
        user::{Nickname, User, UserMarker},
    },
    storage::{ObjectStorage, StorageError, key_from_url},
    store::{self, PostStore, PostTransaction, StoreError, UserStore},
    util::PageSize,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use time::{Duration, OffsetDateTime};

pub const TEST_PUBLIC_URL: &str = "https://cdn.test/images";

#[derive(Clone, Debug)]
struct StoredPost {
    author: Id<UserMarker>,
    content: PostContent,
}

#[derive(Clone, Debug, Default)]
struct MemoryState {
    next_user_id: u64,
    next_post_id: u64,
    next_image_id: u64,
    accounts: Vec<Account>,
    user_tags: BTreeMap<Id<UserMarker>, BTreeSet<Id<HobbyTagMarker>>>,
    tags: Vec<HobbyTag>,
    posts: BTreeMap<Id<PostMarker>, StoredPost>,
    images: Vec<PostImage>,
    post_tags: BTreeSet<(Id<PostMarker>, Id<HobbyTagMarker>)>,
    comments: BTreeMap<Id<PostMarker>, u64>,
}

impl MemoryState {
    fn user(&self, user_id: Id<UserMarker>) -> Option<User> {
        self.accounts
            .iter()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone())
    }

    fn tag(&self, tag_id: Id<HobbyTagMarker>) -> Option<HobbyTag> {
        self.tags.iter().find(|tag| tag.id == tag_id).cloned()
    }

    fn post_images(&self, post_id: Id<PostMarker>) -> Vec<PostImage> {
        self.images
            .iter()
            .filter(|image| image.post == post_id)
            .cloned()
            .collect()
    }

    fn post_hobby_tags(&self, post_id: Id<PostMarker>) -> Vec<HobbyTag> {
        self.post_tags
            .iter()
            .filter(|(post, _)| *post == post_id)
            .filter_map(|(_, tag)| self.tag(*tag))
            .collect()
    }

    fn post(&self, post_id: Id<PostMarker>) -> Option<Post> {
        let stored = self.posts.get(&post_id)?;
        Some(Post {
            id: post_id,
            author: stored.author,
            content: stored.content.clone(),
            images: self.post_images(post_id),
            hobby_tags: self.post_hobby_tags(post_id),
        })
    }

    fn summary(&self, post_id: Id<PostMarker>) -> Option<PostSummary> {
        let stored = self.posts.get(&post_id)?;
        Some(PostSummary {
            id: post_id,
            author: self.user(stored.author)?,
            content: stored.content.clone(),
            images: self.post_images(post_id),
            hobby_tags: self.post_hobby_tags(post_id),
            created_at: OffsetDateTime::UNIX_EPOCH
                + Duration::seconds(post_id.get().cast_signed()),
        })
    }

    fn page(
        &self,
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
        filter: impl Fn(Id<PostMarker>) -> bool,
    ) -> Vec<Id<PostMarker>> {
        self.posts
            .keys()
            .rev()
            .copied()
            .filter(|id| before.is_none_or(|before| *id < before))
            .filter(|id| filter(*id))
            .take(page_size.get() as usize)
            .collect()
    }
}

/// Post and user store whose transactions work on a copy of the state and
/// publish it on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_image_insert: Mutex<Option<usize>>,
    failing_user_tags: AtomicBool,
}

impl MemoryStore {
    pub fn with_tags(names: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.tags = names
                .iter()
                .zip(1..)
                .map(|(name, id)| HobbyTag {
                    id: Id::new(id),
                    name: (*name).to_owned(),
                })
                .collect();
        }
        store
    }

    /// The `nth` image insert (1-based) of every later transaction fails.
    pub fn fail_image_insert(&self, nth: usize) {
        *self.failing_image_insert.lock().unwrap() = Some(nth);
    }

    pub fn fail_user_tag_updates(&self) {
        self.failing_user_tags.store(true, Ordering::SeqCst);
    }

    pub fn add_user(&self, nickname: &str) -> Id<UserMarker> {
        let mut state = self.state.lock().unwrap();
        state.next_user_id += 1;
        let id = Id::new(state.next_user_id);
        state.accounts.push(Account {
            user: User {
                id,
                nickname: Nickname::new(nickname.to_owned()).unwrap(),
            },
            email: Email::new(format!("{nickname}@example.com")).unwrap(),
            password_hash: String::new(),
        });
        id
    }

    pub fn set_user_tags(&self, user_id: Id<UserMarker>, tags: &[u64]) {
        let mut state = self.state.lock().unwrap();
        state
            .user_tags
            .insert(user_id, tags.iter().copied().map(Id::new).collect());
    }

    /// Inserts a post directly, bypassing the service.
    pub fn add_post(&self, author: Id<UserMarker>, title: &str, tags: &[u64]) -> Id<PostMarker> {
        let mut state = self.state.lock().unwrap();
        state.next_post_id += 1;
        let id = Id::new(state.next_post_id);
        state.posts.insert(
            id,
            StoredPost {
                author,
                content: PostContent::new(title.to_owned(), String::new()).unwrap(),
            },
        );
        for tag in tags {
            state.post_tags.insert((id, Id::new(*tag)));
        }
        id
    }

    pub fn add_image(&self, post_id: Id<PostMarker>, url: &str) -> Id<PostImageMarker> {
        let mut state = self.state.lock().unwrap();
        state.next_image_id += 1;
        let id = Id::new(state.next_image_id);
        state.images.push(PostImage {
            id,
            post: post_id,
            url: url.to_owned(),
        });
        id
    }

    pub fn add_comments(&self, post_id: Id<PostMarker>, count: u64) {
        let mut state = self.state.lock().unwrap();
        *state.comments.entry(post_id).or_default() += count;
    }

    pub fn post(&self, post_id: Id<PostMarker>) -> Option<Post> {
        self.state.lock().unwrap().post(post_id)
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    pub fn image_count(&self) -> usize {
        self.state.lock().unwrap().images.len()
    }

    pub fn account(&self, email: &str) -> Option<Account> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|account| account.email.get() == email)
            .cloned()
    }
}

#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    failing_image_insert: Option<usize>,
    image_inserts: usize,
}

#[async_trait]
impl PostStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> store::Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working: self.state.lock().unwrap().clone(),
            failing_image_insert: *self.failing_image_insert.lock().unwrap(),
            image_inserts: 0,
        })
    }

    async fn fetch_post_summary(
        &self,
        post_id: Id<PostMarker>,
    ) -> store::Result<Option<PostSummary>> {
        Ok(self.state.lock().unwrap().summary(post_id))
    }

    async fn fetch_post_ids(
        &self,
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> store::Result<Vec<Id<PostMarker>>> {
        Ok(self.state.lock().unwrap().page(before, page_size, |_| true))
    }

    async fn fetch_post_ids_with_tags(
        &self,
        tags: &[Id<HobbyTagMarker>],
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> store::Result<Vec<Id<PostMarker>>> {
        let state = self.state.lock().unwrap();
        Ok(state.page(before, page_size, |post_id| {
            tags.iter()
                .any(|tag| state.post_tags.contains(&(post_id, *tag)))
        }))
    }

    async fn fetch_post_summaries(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> store::Result<Vec<PostSummary>> {
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<PostSummary> = post_ids
            .iter()
            .filter_map(|post_id| state.summary(*post_id))
            .collect();
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(summaries)
    }

    async fn fetch_comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> store::Result<Vec<CommentCount>> {
        let state = self.state.lock().unwrap();
        Ok(post_ids
            .iter()
            .filter_map(|post_id| {
                state.comments.get(post_id).map(|count| CommentCount {
                    post: *post_id,
                    count: *count,
                })
            })
            .collect())
    }

    async fn fetch_user_hobby_tag_ids(
        &self,
        user_id: Id<UserMarker>,
    ) -> store::Result<Vec<Id<HobbyTagMarker>>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .user_tags
            .get(&user_id)
            .map(|tags| tags.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn post_image_exists(&self, image_id: Id<PostImageMarker>) -> store::Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.images.iter().any(|image| image.id == image_id))
    }
}

#[async_trait]
impl PostTransaction for MemoryTransaction {
    async fn fetch_post(&mut self, post_id: Id<PostMarker>) -> store::Result<Option<Post>> {
        Ok(self.working.post(post_id))
    }

    async fn create_post(
        &mut self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> store::Result<Id<PostMarker>> {
        self.working.next_post_id += 1;
        let id = Id::new(self.working.next_post_id);
        self.working.posts.insert(
            id,
            StoredPost {
                author,
                content: content.clone(),
            },
        );
        Ok(id)
    }

    async fn update_post_content(
        &mut self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> store::Result<()> {
        if let Some(post) = self.working.posts.get_mut(&post_id) {
            post.content = content.clone();
        }
        Ok(())
    }

    async fn delete_post(&mut self, post_id: Id<PostMarker>) -> store::Result<()> {
        self.working.posts.remove(&post_id);
        self.working.images.retain(|image| image.post != post_id);
        self.working.post_tags.retain(|(post, _)| *post != post_id);
        self.working.comments.remove(&post_id);
        Ok(())
    }

    async fn create_post_image(
        &mut self,
        post_id: Id<PostMarker>,
        url: &str,
    ) -> store::Result<PostImage> {
        self.image_inserts += 1;
        if self.failing_image_insert == Some(self.image_inserts) {
            return Err(StoreError::Backend("injected image insert failure".into()));
        }

        self.working.next_image_id += 1;
        let image = PostImage {
            id: Id::new(self.working.next_image_id),
            post: post_id,
            url: url.to_owned(),
        };
        self.working.images.push(image.clone());
        Ok(image)
    }

    async fn delete_post_image(&mut self, image_id: Id<PostImageMarker>) -> store::Result<()> {
        self.working.images.retain(|image| image.id != image_id);
        Ok(())
    }

    async fn fetch_hobby_tags_by_names(
        &mut self,
        names: &[String],
    ) -> store::Result<Vec<HobbyTag>> {
        Ok(self
            .working
            .tags
            .iter()
            .filter(|tag| names.contains(&tag.name))
            .cloned()
            .collect())
    }

    async fn replace_post_hobby_tags(
        &mut self,
        post_id: Id<PostMarker>,
        tags: &[Id<HobbyTagMarker>],
    ) -> store::Result<()> {
        self.working.post_tags.retain(|(post, _)| *post != post_id);
        for tag in tags {
            self.working.post_tags.insert((post_id, *tag));
        }
        Ok(())
    }

    async fn commit(self) -> store::Result<()> {
        *self.shared.lock().unwrap() = self.working;
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn fetch_account_by_email(&self, email: &Email) -> store::Result<Option<Account>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|account| account.email == *email)
            .cloned())
    }

    async fn create_account(&self, account: &CreateAccount) -> store::Result<User> {
        let mut state = self.state.lock().unwrap();
        if state.accounts.iter().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict("users_email_key".to_owned()));
        }

        state.next_user_id += 1;
        let user = User {
            id: Id::new(state.next_user_id),
            nickname: account.nickname.clone(),
        };
        state.accounts.push(Account {
            user: user.clone(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
        });
        Ok(user)
    }

    async fn replace_user_hobby_tags(
        &self,
        user_id: Id<UserMarker>,
        names: &[String],
    ) -> store::Result<Vec<HobbyTag>> {
        if self.failing_user_tags.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected user tag failure".into()));
        }

        let mut state = self.state.lock().unwrap();
        let tags: Vec<HobbyTag> = state
            .tags
            .iter()
            .filter(|tag| names.contains(&tag.name))
            .cloned()
            .collect();
        state
            .user_tags
            .insert(user_id, tags.iter().map(|tag| tag.id).collect());
        Ok(tags)
    }

    async fn fetch_user_hobby_tags(
        &self,
        user_id: Id<UserMarker>,
    ) -> store::Result<Vec<HobbyTag>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .user_tags
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|tag| state.tag(*tag))
            .collect())
    }
}

/// Object storage that keeps objects in memory and records deletions.
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<BTreeMap<String, Bytes>>,
    deleted: Mutex<Vec<String>>,
    failing_puts: Mutex<HashSet<String>>,
}

impl MemoryObjectStorage {
    pub fn fail_puts_for(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_owned());
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    fn url_for(&self, name: &str) -> String {
        format!("{TEST_PUBLIC_URL}/{name}")
    }

    fn object_key<'a>(&self, url: &'a str) -> &'a str {
        key_from_url(TEST_PUBLIC_URL, url)
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(StorageError::Io {
                key: key.to_owned(),
                source: std::io::Error::other("injected put failure"),
            });
        }

        self.objects.lock().unwrap().insert(key.to_owned(), data);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_owned());
        Ok(())
    }
}
