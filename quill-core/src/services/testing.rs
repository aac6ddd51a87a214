//! In-memory repositories for service tests.
//!
//! Transactions snapshot the whole state on `begin` and restore it on
//! `rollback`. `fail_on` makes one named repository method fail once, to
//! exercise rollback paths.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    Error,
    audit::AuditContext,
    category::{Category, slugify},
    crypto::hash_password,
    error::StorageError,
    id::{AccountId, CategoryId, PostId},
    login::{LoginLock, LoginRecord, LoginStatus},
    post::{Page, Post, PostDraft, PostQuery, PostSort, PostStatus, PublishedPost, StatusCounts},
    repositories::{
        AccountRepository, CategoryRepository, LoginAuditRepository, PostRepository,
        Transactional,
    },
    user::{Account, ClientInfo, NewAccount, ProfileUpdate},
};

/// Fixed test clock: 2025-03-11 17:00:00 UTC plus `minutes`.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 11, 17, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

#[derive(Debug, Clone)]
struct StoredAccount {
    account: Account,
    password_hash: String,
    reset_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct State {
    accounts: Vec<StoredAccount>,
    posts: Vec<Post>,
    links: Vec<(PostId, CategoryId)>,
    categories: Vec<Category>,
    history: Vec<LoginRecord>,
    locks: Vec<LoginLock>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: State,
    snapshot: Option<State>,
    fail_on: Option<&'static str>,
    commits: u32,
    rollbacks: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_account(&mut self, username: &str, email: &str, password: &str) -> AccountId {
        let ctx = AuditContext::new("system", at(-60));
        self.create_account(
            &NewAccount {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password),
                display_name: None,
            },
            &ctx,
        )
        .await
        .unwrap()
        .id
    }

    pub fn add_category(&mut self, name: &str) -> CategoryId {
        let id = CategoryId::new(self.state.next_id());
        self.state.categories.push(Category {
            id,
            name: name.to_string(),
            slug: slugify(name),
            created_at: None,
            created_by: None,
        });
        id
    }

    pub fn fail_on(&mut self, method: &'static str) {
        self.fail_on = Some(method);
    }

    pub fn account(&self, id: AccountId) -> &Account {
        &self.stored(id).unwrap().account
    }

    pub fn post(&self, id: PostId) -> &Post {
        self.state.posts.iter().find(|p| p.id == id).unwrap()
    }

    pub fn set_attempts(&mut self, id: AccountId, attempts: u32, last: Option<DateTime<Utc>>) {
        let stored = self.stored_mut(id).unwrap();
        stored.account.login_attempts = attempts;
        stored.account.last_attempt_time = last;
    }

    pub fn set_profile_image(&mut self, id: AccountId, image: Option<&str>) {
        self.stored_mut(id).unwrap().account.profile_image = image.map(str::to_string);
    }

    pub fn password_hash_of(&self, id: AccountId) -> Option<String> {
        self.stored(id).map(|s| s.password_hash.clone())
    }

    pub fn reset_token_of(&self, id: AccountId) -> Option<String> {
        self.stored(id).and_then(|s| s.reset_token.clone())
    }

    pub fn history_statuses(&self, id: AccountId) -> Vec<LoginStatus> {
        self.state
            .history
            .iter()
            .filter(|r| r.user_id == id)
            .map(|r| r.status)
            .collect()
    }

    pub fn latest_lock_of(&self, id: AccountId) -> Option<LoginLock> {
        self.state.locks.iter().rev().find(|l| l.user_id == id).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.state.accounts.len()
    }

    pub fn post_count(&self) -> usize {
        self.state.posts.len()
    }

    pub fn link_count(&self) -> usize {
        self.state.links.len()
    }

    pub fn commits(&self) -> u32 {
        self.commits
    }

    pub fn rollbacks(&self) -> u32 {
        self.rollbacks
    }

    fn check(&mut self, method: &'static str) -> Result<(), Error> {
        if self.fail_on == Some(method) {
            self.fail_on = None;
            return Err(StorageError::Query(format!("simulated failure in {method}")).into());
        }
        Ok(())
    }

    fn stored(&self, id: AccountId) -> Option<&StoredAccount> {
        self.state.accounts.iter().find(|s| s.account.id == id)
    }

    fn stored_mut(&mut self, id: AccountId) -> Option<&mut StoredAccount> {
        self.state.accounts.iter_mut().find(|s| s.account.id == id)
    }

    fn published(&self, post: &Post) -> Option<PublishedPost> {
        if !post.is_published() {
            return None;
        }
        let author = &self.stored(post.user_id)?.account;
        let mut categories: Vec<String> = self
            .state
            .links
            .iter()
            .filter(|(p, _)| *p == post.id)
            .filter_map(|(_, c)| self.state.categories.iter().find(|cat| cat.id == *c))
            .map(|c| c.name.clone())
            .collect();
        categories.sort();
        Some(PublishedPost {
            post: post.clone(),
            author_username: author.username.clone(),
            author_display_name: author.display_name.clone(),
            author_image: author.profile_image.clone(),
            categories,
        })
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create_account(
        &mut self,
        new: &NewAccount,
        ctx: &AuditContext,
    ) -> Result<Account, Error> {
        self.check("create_account")?;
        let account = Account {
            id: AccountId::new(self.state.next_id()),
            username: new.username.clone(),
            email: new.email.clone(),
            display_name: new.display_name.clone(),
            profile_image: None,
            bio: None,
            login_attempts: 0,
            last_attempt_time: None,
            last_login: None,
            reset_token_expires_at: None,
            created_at: Some(ctx.timestamp()),
            created_by: Some(ctx.actor().to_string()),
            updated_at: None,
            updated_by: None,
        };
        self.state.accounts.push(StoredAccount {
            account: account.clone(),
            password_hash: new.password_hash.clone(),
            reset_token: None,
        });
        Ok(account)
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>, Error> {
        Ok(self.stored(id).map(|s| s.account.clone()))
    }

    async fn find_account_by_username(&mut self, username: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .state
            .accounts
            .iter()
            .find(|s| s.account.username == username)
            .map(|s| s.account.clone()))
    }

    async fn find_account_by_email(&mut self, email: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .state
            .accounts
            .iter()
            .find(|s| s.account.email == email)
            .map(|s| s.account.clone()))
    }

    async fn find_account_by_login(&mut self, identifier: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .state
            .accounts
            .iter()
            .find(|s| s.account.username == identifier || s.account.email == identifier)
            .map(|s| s.account.clone()))
    }

    async fn is_username_or_email_taken(
        &mut self,
        username: &str,
        email: &str,
        exclude: Option<AccountId>,
    ) -> Result<bool, Error> {
        Ok(self.state.accounts.iter().any(|s| {
            Some(s.account.id) != exclude
                && (s.account.username == username || s.account.email == email)
        }))
    }

    async fn password_hash(&mut self, id: AccountId) -> Result<Option<String>, Error> {
        Ok(self.password_hash_of(id))
    }

    async fn set_password_hash(
        &mut self,
        id: AccountId,
        hash: &str,
        ctx: &AuditContext,
    ) -> Result<(), Error> {
        self.check("set_password_hash")?;
        let stored = self.stored_mut(id).ok_or(StorageError::NotFound)?;
        stored.password_hash = hash.to_string();
        stored.account.updated_at = Some(ctx.timestamp());
        stored.account.updated_by = Some(ctx.actor().to_string());
        Ok(())
    }

    async fn update_profile(
        &mut self,
        id: AccountId,
        profile: &ProfileUpdate,
        ctx: &AuditContext,
    ) -> Result<(), Error> {
        self.check("update_profile")?;
        let account = &mut self.stored_mut(id).ok_or(StorageError::NotFound)?.account;
        account.username = profile.username.clone();
        account.email = profile.email.clone();
        account.display_name = profile.display_name.clone();
        account.bio = profile.bio.clone();
        account.profile_image = profile.profile_image.clone();
        account.updated_at = Some(ctx.timestamp());
        account.updated_by = Some(ctx.actor().to_string());
        Ok(())
    }

    async fn record_failed_attempt(
        &mut self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<u32, Error> {
        self.check("record_failed_attempt")?;
        let account = &mut self.stored_mut(id).ok_or(StorageError::NotFound)?.account;
        account.login_attempts += 1;
        account.last_attempt_time = Some(at);
        Ok(account.login_attempts)
    }

    async fn reset_login_attempts(&mut self, id: AccountId) -> Result<(), Error> {
        self.check("reset_login_attempts")?;
        self.stored_mut(id)
            .ok_or(StorageError::NotFound)?
            .account
            .login_attempts = 0;
        Ok(())
    }

    async fn record_successful_login(
        &mut self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.check("record_successful_login")?;
        let account = &mut self.stored_mut(id).ok_or(StorageError::NotFound)?.account;
        account.login_attempts = 0;
        account.last_login = Some(at);
        Ok(())
    }

    async fn set_reset_token(
        &mut self,
        id: AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let stored = self.stored_mut(id).ok_or(StorageError::NotFound)?;
        stored.reset_token = Some(token_hash.to_string());
        stored.account.reset_token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn find_account_by_reset_token(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, Error> {
        Ok(self
            .state
            .accounts
            .iter()
            .find(|s| {
                s.reset_token.as_deref() == Some(token_hash)
                    && s.account.reset_token_expires_at.is_some_and(|exp| exp > now)
            })
            .map(|s| s.account.clone()))
    }

    async fn clear_reset_token(&mut self, id: AccountId) -> Result<(), Error> {
        self.check("clear_reset_token")?;
        let stored = self.stored_mut(id).ok_or(StorageError::NotFound)?;
        stored.reset_token = None;
        stored.account.reset_token_expires_at = None;
        Ok(())
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<u64, Error> {
        self.check("delete_account")?;
        let before = self.state.accounts.len();
        self.state.accounts.retain(|s| s.account.id != id);
        Ok((before - self.state.accounts.len()) as u64)
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn insert_post(
        &mut self,
        owner: AccountId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<Post, Error> {
        self.check("insert_post")?;
        let post = Post {
            id: PostId::new(self.state.next_id()),
            user_id: owner,
            title: draft.title.clone(),
            content: draft.content.clone(),
            status: draft.status,
            featured_image: draft.featured_image.clone(),
            view_count: 0,
            created_at: Some(ctx.timestamp()),
            created_by: Some(ctx.actor().to_string()),
            updated_at: None,
            updated_by: None,
        };
        self.state.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(
        &mut self,
        owner: AccountId,
        id: PostId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<u64, Error> {
        self.check("update_post")?;
        let Some(post) = self
            .state
            .posts
            .iter_mut()
            .find(|p| p.id == id && p.user_id == owner)
        else {
            return Ok(0);
        };
        post.title = draft.title.clone();
        post.content = draft.content.clone();
        post.status = draft.status;
        post.featured_image = draft.featured_image.clone();
        post.updated_at = Some(ctx.timestamp());
        post.updated_by = Some(ctx.actor().to_string());
        Ok(1)
    }

    async fn delete_post(&mut self, owner: AccountId, id: PostId) -> Result<u64, Error> {
        self.check("delete_post")?;
        let before = self.state.posts.len();
        self.state
            .posts
            .retain(|p| !(p.id == id && p.user_id == owner));
        Ok((before - self.state.posts.len()) as u64)
    }

    async fn find_owned_post(
        &mut self,
        owner: AccountId,
        id: PostId,
    ) -> Result<Option<Post>, Error> {
        Ok(self
            .state
            .posts
            .iter()
            .find(|p| p.id == id && p.user_id == owner)
            .cloned())
    }

    async fn post_category_ids(&mut self, id: PostId) -> Result<Vec<CategoryId>, Error> {
        Ok(self
            .state
            .links
            .iter()
            .filter(|(p, _)| *p == id)
            .map(|(_, c)| *c)
            .collect())
    }

    async fn set_post_categories(
        &mut self,
        id: PostId,
        categories: &[CategoryId],
    ) -> Result<(), Error> {
        self.check("set_post_categories")?;
        self.state.links.retain(|(p, _)| *p != id);
        self.state
            .links
            .extend(categories.iter().map(|c| (id, *c)));
        Ok(())
    }

    async fn delete_post_categories(&mut self, id: PostId) -> Result<u64, Error> {
        self.check("delete_post_categories")?;
        let before = self.state.links.len();
        self.state.links.retain(|(p, _)| *p != id);
        Ok((before - self.state.links.len()) as u64)
    }

    async fn list_owned_posts(
        &mut self,
        owner: AccountId,
        query: &PostQuery,
    ) -> Result<Page<Post>, Error> {
        let mut posts: Vec<Post> = self
            .state
            .posts
            .iter()
            .filter(|p| p.user_id == owner)
            .filter(|p| query.status.is_none_or(|s| p.status == s))
            .filter(|p| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|q| p.title.contains(q) || p.content.contains(q))
            })
            .cloned()
            .collect();

        match query.sort {
            PostSort::Newest => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            PostSort::Oldest => posts.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            PostSort::Title => posts.sort_by(|a, b| a.title.cmp(&b.title)),
            PostSort::Views => posts.sort_by(|a, b| b.view_count.cmp(&a.view_count)),
        }

        let total = posts.len() as u64;
        let items = posts
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn status_counts(&mut self, owner: AccountId) -> Result<StatusCounts, Error> {
        let mut counts = StatusCounts::default();
        for post in self.state.posts.iter().filter(|p| p.user_id == owner) {
            match post.status {
                PostStatus::Draft => counts.draft += 1,
                PostStatus::Published => counts.published += 1,
            }
        }
        Ok(counts)
    }

    async fn list_published(
        &mut self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<PublishedPost>, Error> {
        let mut posts: Vec<PublishedPost> = self
            .state
            .posts
            .iter()
            .filter_map(|p| self.published(p))
            .collect();
        posts.sort_by(|a, b| b.post.created_at.cmp(&a.post.created_at));

        let total = posts.len() as u64;
        let items = posts
            .into_iter()
            .skip((page.saturating_sub(1) * per_page) as usize)
            .take(per_page as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    async fn find_published(&mut self, id: PostId) -> Result<Option<PublishedPost>, Error> {
        Ok(self
            .state
            .posts
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| self.published(p)))
    }

    async fn published_by_author(
        &mut self,
        owner: AccountId,
    ) -> Result<Vec<PublishedPost>, Error> {
        Ok(self
            .state
            .posts
            .iter()
            .filter(|p| p.user_id == owner)
            .filter_map(|p| self.published(p))
            .collect())
    }

    async fn increment_view_count(&mut self, id: PostId) -> Result<(), Error> {
        if let Some(post) = self.state.posts.iter_mut().find(|p| p.id == id) {
            post.view_count += 1;
        }
        Ok(())
    }

    async fn featured_images_of(&mut self, owner: AccountId) -> Result<Vec<String>, Error> {
        Ok(self
            .state
            .posts
            .iter()
            .filter(|p| p.user_id == owner)
            .filter_map(|p| p.featured_image.clone())
            .collect())
    }

    async fn delete_category_links_of(&mut self, owner: AccountId) -> Result<u64, Error> {
        self.check("delete_category_links_of")?;
        let owned: Vec<PostId> = self
            .state
            .posts
            .iter()
            .filter(|p| p.user_id == owner)
            .map(|p| p.id)
            .collect();
        let before = self.state.links.len();
        self.state.links.retain(|(p, _)| !owned.contains(p));
        Ok((before - self.state.links.len()) as u64)
    }

    async fn delete_posts_of(&mut self, owner: AccountId) -> Result<u64, Error> {
        self.check("delete_posts_of")?;
        let before = self.state.posts.len();
        self.state.posts.retain(|p| p.user_id != owner);
        Ok((before - self.state.posts.len()) as u64)
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn list_categories(&mut self) -> Result<Vec<Category>, Error> {
        let mut categories = self.state.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_category(&mut self, id: CategoryId) -> Result<Option<Category>, Error> {
        Ok(self.state.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn category_exists(&mut self, name: &str, slug: &str) -> Result<bool, Error> {
        Ok(self
            .state
            .categories
            .iter()
            .any(|c| c.name == name || c.slug == slug))
    }

    async fn create_category(
        &mut self,
        name: &str,
        slug: &str,
        ctx: &AuditContext,
    ) -> Result<Category, Error> {
        let category = Category {
            id: CategoryId::new(self.state.next_id()),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Some(ctx.timestamp()),
            created_by: Some(ctx.actor().to_string()),
        };
        self.state.categories.push(category.clone());
        Ok(category)
    }
}

#[async_trait]
impl LoginAuditRepository for MemoryStore {
    async fn record_login(
        &mut self,
        id: AccountId,
        status: LoginStatus,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let record = LoginRecord {
            id: self.state.next_id(),
            user_id: id,
            login_time: at,
            ip_address: Some(client.ip_address.clone()),
            user_agent: Some(client.user_agent.clone()),
            status,
        };
        self.state.history.push(record);
        Ok(())
    }

    async fn login_history(
        &mut self,
        id: AccountId,
        limit: u32,
    ) -> Result<Vec<LoginRecord>, Error> {
        Ok(self
            .state
            .history
            .iter()
            .rev()
            .filter(|r| r.user_id == id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn open_lock(
        &mut self,
        id: AccountId,
        lock_until: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let lock = LoginLock {
            id: self.state.next_id(),
            user_id: id,
            lock_until,
            created_at: at,
            released_at: None,
        };
        self.state.locks.push(lock);
        Ok(())
    }

    async fn release_locks(&mut self, id: AccountId, at: DateTime<Utc>) -> Result<u64, Error> {
        let mut released = 0;
        for lock in self
            .state
            .locks
            .iter_mut()
            .filter(|l| l.user_id == id && l.released_at.is_none())
        {
            lock.released_at = Some(at);
            released += 1;
        }
        Ok(released)
    }

    async fn latest_lock(&mut self, id: AccountId) -> Result<Option<LoginLock>, Error> {
        Ok(self
            .state
            .locks
            .iter()
            .rev()
            .find(|l| l.user_id == id && l.released_at.is_none())
            .cloned())
    }

    async fn delete_login_records(&mut self, id: AccountId) -> Result<u64, Error> {
        self.check("delete_login_records")?;
        let before = self.state.history.len() + self.state.locks.len();
        self.state.history.retain(|r| r.user_id != id);
        self.state.locks.retain(|l| l.user_id != id);
        Ok((before - self.state.history.len() - self.state.locks.len()) as u64)
    }
}

#[async_trait]
impl Transactional for MemoryStore {
    async fn begin(&mut self) -> Result<(), Error> {
        if self.snapshot.is_some() {
            return Err(StorageError::Transaction("transaction already active".to_string()).into());
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        self.snapshot
            .take()
            .ok_or_else(|| StorageError::Transaction("no active transaction".to_string()))?;
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.state = self
            .snapshot
            .take()
            .ok_or_else(|| StorageError::Transaction("no active transaction".to_string()))?;
        self.rollbacks += 1;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}
