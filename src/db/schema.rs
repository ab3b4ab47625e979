use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Catalog categories (read-mostly)
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        -- Catalog products (read-mostly; never mutated by the payment flow)
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            image TEXT,
            price_cents INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT 'USD',
            is_free INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            download_limit INTEGER NOT NULL DEFAULT 5,
            updates_exp_days INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
        CREATE INDEX IF NOT EXISTS idx_products_active ON products(id) WHERE is_active = 1;

        -- Cart lines, keyed by visitor session. Ephemeral: destroyed on
        -- checkout completion or explicit clear. No prices stored here.
        -- product_id is deliberately unconstrained: a line whose product was
        -- deleted must survive so checkout validation can report it.
        CREATE TABLE IF NOT EXISTS cart_items (
            session_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity BETWEEN 1 AND 10),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (session_id, product_id)
        );
        CREATE INDEX IF NOT EXISTS idx_cart_items_session ON cart_items(session_id);

        -- Orders. payment_status transitions are applied as conditional
        -- updates so concurrent webhook deliveries cannot double-apply.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            user_id TEXT,
            customer_name TEXT NOT NULL,
            customer_email TEXT NOT NULL,
            payment_method TEXT NOT NULL CHECK (payment_method IN ('paypal', 'mercadopago', 'free')),
            payment_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (payment_status IN ('pending', 'completed', 'failed', 'refunded')),
            subtotal_cents INTEGER NOT NULL,
            tax_cents INTEGER NOT NULL DEFAULT 0,
            total_amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_id TEXT,
            failure_reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            completed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_orders_number ON orders(order_number);
        CREATE INDEX IF NOT EXISTS idx_orders_email ON orders(customer_email);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(payment_status);
        CREATE INDEX IF NOT EXISTS idx_orders_payment_id ON orders(payment_id);

        -- Order lines, denormalized at purchase time. Immutable once the
        -- order completes; product_id carries no FK so the catalog row can
        -- be deleted without touching the sales record.
        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            is_free INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);
        CREATE INDEX IF NOT EXISTS idx_order_items_product ON order_items(product_id);

        -- Licenses granted on order completion. The UNIQUE(product_id,
        -- order_id) pair is the idempotency guard against duplicate grants.
        -- product_id has no FK: grants must succeed for products deleted
        -- after purchase, using the terms denormalized into order_items.
        CREATE TABLE IF NOT EXISTS user_licenses (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            customer_email TEXT NOT NULL,
            product_id TEXT NOT NULL,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            download_limit INTEGER NOT NULL,
            downloads_used INTEGER NOT NULL DEFAULT 0,
            updates_expires_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            UNIQUE(product_id, order_id)
        );
        CREATE INDEX IF NOT EXISTS idx_user_licenses_user ON user_licenses(user_id);
        CREATE INDEX IF NOT EXISTS idx_user_licenses_email ON user_licenses(customer_email);
        CREATE INDEX IF NOT EXISTS idx_user_licenses_order ON user_licenses(order_id);

        -- Donations. Lifecycle mirrors orders with no license side effect.
        CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            transaction_id TEXT NOT NULL UNIQUE,
            amount_cents INTEGER NOT NULL,
            final_amount_cents INTEGER,
            currency TEXT NOT NULL,
            payment_method TEXT NOT NULL CHECK (payment_method IN ('paypal', 'mercadopago')),
            payment_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (payment_status IN ('pending', 'completed', 'failed')),
            donor_name TEXT,
            donor_email TEXT,
            donor_message TEXT,
            product_id TEXT REFERENCES products(id) ON DELETE SET NULL,
            payment_id TEXT,
            webhook_received INTEGER NOT NULL DEFAULT 0,
            webhook_data TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_donations_transaction ON donations(transaction_id);
        CREATE INDEX IF NOT EXISTS idx_donations_status ON donations(payment_status);

        -- Raw webhook deliveries, written before processing. Gateways retry
        -- undelivered-ack webhooks, so duplicates are expected here.
        CREATE TABLE IF NOT EXISTS webhook_logs (
            id TEXT PRIMARY KEY,
            gateway TEXT NOT NULL,
            event_type TEXT,
            external_ref TEXT,
            payload TEXT NOT NULL,
            outcome TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_ref ON webhook_logs(external_ref);
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_created ON webhook_logs(created_at);
        "#,
    )?;
    Ok(())
}
