//! MySQL-backed store.

use crate::config::DatabaseConfig;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use confab_core::{
    ConversationStore, HistoryEntry, Message, MessageStore, ParticipantId, PartnerDoc, Profile,
    ReadReceipt, RoomId, StoreError, StoreResult,
};
use confab_protocol::Timestamp;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{FromRow, MySql, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

/// Store over the platform's chat and business-partner tables.
#[derive(Clone)]
pub struct SqlStore {
    pool: MySqlPool,
}

impl SqlStore {
    /// Connect using the configured URL.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured or the pool cannot connect.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("no database URL configured".into()))?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(StoreError::backend)?;

        info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the chat tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        info!("Database migrations applied");
        Ok(())
    }
}

fn timestamp(naive: NaiveDateTime) -> Timestamp {
    Timestamp::from_datetime(naive.and_utc())
}

#[derive(FromRow)]
struct HistoryRow {
    message_id: String,
    chat_room: String,
    business_partner: i64,
    content: String,
    sent_at: NaiveDateTime,
    read_status_id: Option<String>,
    read_at: Option<NaiveDateTime>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            message_id: row.message_id,
            chat_room: row.chat_room,
            business_partner: row.business_partner,
            content: row.content,
            sent_at: timestamp(row.sent_at),
            read_status_id: row.read_status_id,
            read_at: row.read_at.map(timestamp),
        }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    business_partner: i64,
    business_partner_type: String,
    nick_name: String,
    profile_comment: Option<String>,
    preferable_local_sub_region: String,
    preferable_local_region: String,
    preferable_country: String,
    local_region_name: Option<String>,
    local_sub_region_name: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            business_partner: row.business_partner,
            business_partner_type: row.business_partner_type,
            nick_name: row.nick_name,
            profile_comment: row.profile_comment,
            preferable_local_sub_region: row.preferable_local_sub_region,
            preferable_local_region: row.preferable_local_region,
            preferable_country: row.preferable_country,
            local_region_name: row.local_region_name,
            local_sub_region_name: row.local_sub_region_name,
        }
    }
}

#[derive(FromRow)]
struct DocRow {
    business_partner: i64,
    doc_type: String,
    doc_version_id: i32,
    doc_id: String,
    file_extension: String,
    file_name: Option<String>,
    file_path: Option<String>,
    doc_issuer_business_partner: Option<i64>,
}

impl From<DocRow> for PartnerDoc {
    fn from(row: DocRow) -> Self {
        Self {
            business_partner: row.business_partner,
            doc_type: row.doc_type,
            doc_version_id: row.doc_version_id,
            doc_id: row.doc_id,
            file_extension: row.file_extension,
            file_name: row.file_name,
            file_path: row.file_path,
            doc_issuer_business_partner: row.doc_issuer_business_partner,
        }
    }
}

#[async_trait]
impl MessageStore for SqlStore {
    async fn append_message(&self, message: &Message) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO data_platform_chat_room_message_data
                (MessageID, ChatRoom, BusinessPartner, Content, SentAt)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                ChatRoom = VALUES(ChatRoom),
                BusinessPartner = VALUES(BusinessPartner),
                Content = VALUES(Content),
                SentAt = VALUES(SentAt)
            "#,
        )
        .bind(&message.id)
        .bind(&message.room)
        .bind(message.sender)
        .bind(&message.content)
        .bind(message.sent_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        debug!(message_id = %message.id, room = %message.room, "Inserted message");
        Ok(())
    }

    async fn append_read_receipt(&self, receipt: &ReadReceipt) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO data_platform_chat_room_message_read_status_data
                (ReadStatusID, MessageID, Participant, ReadAt)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&receipt.id)
        .bind(&receipt.message_id)
        .bind(receipt.reader)
        .bind(receipt.read_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        debug!(message_id = %receipt.message_id, read_status_id = %receipt.id, "Inserted read status");
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqlStore {
    async fn create_or_find_room(
        &self,
        creator: ParticipantId,
        partner: ParticipantId,
    ) -> StoreResult<RoomId> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let existing: Option<String> = sqlx::query_scalar(
            r#"
            SELECT ChatRoom
            FROM data_platform_chat_room_header_data
            WHERE (RoomCreator = ? AND RoomPartner = ?)
               OR (RoomCreator = ? AND RoomPartner = ?)
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(creator)
        .bind(partner)
        .bind(partner)
        .bind(creator)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if let Some(room) = existing {
            tx.commit().await.map_err(StoreError::backend)?;
            return Ok(room);
        }

        let room = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO data_platform_chat_room_header_data
                (ChatRoom, RoomCreator, RoomPartner, CreatedAt, UpdatedAt)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room)
        .bind(creator)
        .bind(partner)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;
        info!(room = %room, creator, partner, "Created chat room");
        Ok(room)
    }

    async fn fetch_history(&self, room: &str) -> StoreResult<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT
                message.MessageID AS message_id,
                message.ChatRoom AS chat_room,
                message.BusinessPartner AS business_partner,
                message.Content AS content,
                message.SentAt AS sent_at,
                readStatus.ReadStatusID AS read_status_id,
                readStatus.ReadAt AS read_at
            FROM data_platform_chat_room_message_data AS message
            LEFT JOIN data_platform_chat_room_message_read_status_data AS readStatus
                ON message.MessageID = readStatus.MessageID
            WHERE message.ChatRoom = ?
            ORDER BY message.SentAt, message.MessageID
            "#,
        )
        .bind(room)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn fetch_profile(&self, participant: ParticipantId) -> StoreResult<Vec<Profile>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(
            r#"
            SELECT
                bp.BusinessPartner AS business_partner,
                bp.BusinessPartnerType AS business_partner_type,
                bp.NickName AS nick_name,
                bp.ProfileComment AS profile_comment,
                bp.PreferableLocalSubRegion AS preferable_local_sub_region,
                bp.PreferableLocalRegion AS preferable_local_region,
                bp.PreferableCountry AS preferable_country,
                lrtd.LocalRegionName AS local_region_name,
                lsrt.LocalSubRegionName AS local_sub_region_name
            FROM data_platform_business_partner_person_data AS bp
            LEFT JOIN data_platform_local_region_text_data AS lrtd
                ON bp.PreferableLocalRegion = lrtd.LocalRegion
                AND bp.PreferableCountry = lrtd.Country
                AND bp.Language = lrtd.Language
            LEFT JOIN data_platform_local_sub_region_text_data AS lsrt
                ON bp.PreferableLocalSubRegion = lsrt.LocalSubRegion
                AND bp.PreferableLocalRegion = lsrt.LocalRegion
                AND bp.PreferableCountry = lsrt.Country
                AND bp.Language = lsrt.Language
            WHERE bp.BusinessPartner = ?
            "#,
        )
        .bind(participant)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn fetch_partner_docs(
        &self,
        participants: &[ParticipantId],
    ) -> StoreResult<Vec<PartnerDoc>> {
        if participants.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<MySql>::new(
            r#"
            SELECT
                BusinessPartner AS business_partner,
                DocType AS doc_type,
                DocVersionID AS doc_version_id,
                DocID AS doc_id,
                FileExtension AS file_extension,
                FileName AS file_name,
                FilePath AS file_path,
                DocIssuerBusinessPartner AS doc_issuer_business_partner
            FROM data_platform_business_partner_general_doc_data
            WHERE BusinessPartner IN ("#,
        );
        let mut ids = query.separated(", ");
        for participant in participants {
            ids.push_bind(*participant);
        }
        ids.push_unseparated(")");

        let rows: Vec<DocRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        Ok(rows.into_iter().map(PartnerDoc::from).collect())
    }
}
