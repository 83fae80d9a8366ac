//! Solvency and atomicity scenarios: prepaid spot, ledger conservation,
//! shield neutrality, the liquidating lock, and the stop-out cascade.

use broker_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn tick(symbol: &str, bid: Decimal, ask: Decimal, t: i64) -> PriceTick {
    PriceTick::new(
        Symbol::new(symbol),
        Price::new_unchecked(bid),
        Price::new_unchecked(ask),
        Price::new_unchecked(ask),
        Timestamp::from_millis(t),
    )
}

fn spot_engine(balance: Decimal) -> (Engine, AccountId) {
    let mut engine = Engine::new(EngineConfig::default());
    let account = engine
        .init_account(OwnerId(1), AccountKind::Spot, Quote::new(balance), "USDT")
        .unwrap();
    (engine, account)
}

fn margin_engine(balance: Decimal) -> (Engine, AccountId) {
    let mut engine = Engine::new(EngineConfig::default());
    let account = engine
        .init_account(OwnerId(1), AccountKind::Margin, Quote::new(balance), "USDT")
        .unwrap();
    (engine, account)
}

fn buy(account: AccountId, qty: Decimal, price: Decimal) -> TradeIntent {
    TradeIntent::SpotBuy {
        account_id: account,
        symbol: Symbol::new("BTCUSDT"),
        quantity: Qty::new_unchecked(qty),
        price: Price::new_unchecked(price),
        reference: "manual".into(),
    }
}

#[test]
fn rejected_spot_buy_changes_nothing() {
    let (mut engine, account) = spot_engine(dec!(100));

    // 1 BTC at $50,000 against a $100 account
    let err = engine.execute(buy(account, dec!(1), dec!(50000))).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Account(AccountError::InsufficientBalance { .. })
    ));

    // balance, positions, and ledger all untouched (only the opening deposit)
    assert_eq!(engine.account(account).unwrap().cash_balance.value(), dec!(100));
    assert!(engine.list_spot_positions(account).is_empty());
    assert_eq!(engine.ledger_page(account, 0).len(), 1);
}

#[test]
fn buy_prepays_notional_plus_fee() {
    let (mut engine, account) = spot_engine(dec!(10000));

    let receipt = engine.execute(buy(account, dec!(0.1), dec!(50000))).unwrap();
    // notional 5000, fee 5
    assert_eq!(receipt.fee.value(), dec!(5));
    assert_eq!(receipt.balance_after.value(), dec!(4995));

    // fee folded into the basis: (5000 + 5) / 0.1 = 50050
    let position = &engine.list_spot_positions(account)[0];
    assert_eq!(position.avg_cost.value(), dec!(50050));
}

#[test]
fn sell_without_holding_is_rejected() {
    let (mut engine, account) = spot_engine(dec!(1000));

    let err = engine
        .execute(TradeIntent::SpotSell {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            quantity: Qty::new_unchecked(dec!(1)),
            price: Price::new_unchecked(dec!(100)),
            reference: "manual".into(),
        })
        .unwrap_err();
    assert!(matches!(err, ExecutionError::NoHolding(s) if s.as_str() == "BTCUSDT"));

    // nothing moved: just the opening deposit
    assert_eq!(engine.ledger_page(account, 0).len(), 1);
    assert_eq!(engine.account(account).unwrap().cash_balance.value(), dec!(1000));
}

#[test]
fn ledger_reconciles_after_mixed_activity() {
    let (mut engine, account) = spot_engine(dec!(10000));

    engine.execute(buy(account, dec!(0.1), dec!(50000))).unwrap();
    engine
        .execute(TradeIntent::SpotSell {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            quantity: Qty::new_unchecked(dec!(0.04)),
            price: Price::new_unchecked(dec!(52000)),
            reference: "manual".into(),
        })
        .unwrap();
    engine
        .execute(TradeIntent::Adjustment {
            account_id: account,
            amount: Quote::new(dec!(-7.5)),
            description: "promo clawback".into(),
        })
        .unwrap();

    let cash = engine.account(account).unwrap().cash_balance;
    assert_eq!(engine.ledger_net_delta(account), cash);

    // every entry chains: balance_after of one is balance_before of the next
    let entries: Vec<_> = engine.ledger_page(account, 0);
    for pair in entries.windows(2) {
        // page 0 is newest first
        assert_eq!(pair[1].balance_after, pair[0].balance_before);
    }
}

#[test]
fn shield_never_touches_equity() {
    let (mut engine, account) = spot_engine(dec!(10000));
    let receipt = engine.execute(buy(account, dec!(1), dec!(100))).unwrap();
    let position_id = receipt.position_id.unwrap();

    engine.on_price_tick(tick("BTCUSDT", dec!(80), dec!(80), 1_000));
    let unshielded_equity = engine.account_metrics(account).unwrap().equity;

    engine.toggle_shield(account, position_id).unwrap();
    engine.on_price_tick(tick("BTCUSDT", dec!(60), dec!(60), 2_000));

    let metrics = engine.account_metrics(account).unwrap();
    let shielded = &engine.shield_summary(account)[0];

    // display frozen at the snap, equity marked at the live 60
    assert_eq!(shielded.snap_value.unwrap().value(), dec!(80));
    assert_eq!(shielded.true_value.value(), dec!(60));
    assert_eq!(metrics.equity, unshielded_equity.sub(Quote::new(dec!(20))));

    // deactivating reports the drift but still moves no cash
    let cash_before = engine.account(account).unwrap().cash_balance;
    engine.toggle_shield(account, position_id).unwrap();
    assert_eq!(engine.account(account).unwrap().cash_balance, cash_before);
}

#[test]
fn liquidating_position_rejects_user_close() {
    let (mut engine, account) = margin_engine(dec!(10000));
    let receipt = engine
        .execute(TradeIntent::MarginOpen {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Long,
            quantity: Qty::new_unchecked(dec!(1)),
            price: Price::new_unchecked(dec!(1000)),
            leverage: Leverage::new(dec!(10)).unwrap(),
        })
        .unwrap();
    let position_id = receipt.position_id.unwrap();

    // liq price = 1000 * (1 - 0.5/10) = 950. marking at 940 sets the lock,
    // but the fat cash cushion keeps the account itself healthy.
    engine.on_price_tick(tick("BTCUSDT", dec!(940), dec!(940), 1_000));
    let position = &engine.list_margin_positions(account)[0];
    assert!(position.liquidating);

    let err = engine
        .execute(TradeIntent::MarginClose {
            account_id: account,
            position_id,
            price: Price::new_unchecked(dec!(940)),
            reason: CloseReason::UserClosed,
        })
        .unwrap_err();
    assert!(matches!(err, ExecutionError::PositionLiquidating(_)));

    // the lock lifts when the mark recovers
    engine.on_price_tick(tick("BTCUSDT", dec!(960), dec!(960), 2_000));
    engine
        .execute(TradeIntent::MarginClose {
            account_id: account,
            position_id,
            price: Price::new_unchecked(dec!(960)),
            reason: CloseReason::UserClosed,
        })
        .unwrap();
}

#[test]
fn stop_out_scenario() {
    // cash 1000, long 1 @ 1000 at 2x: required 500, maintenance 250
    let (mut engine, account) = margin_engine(dec!(1000));
    engine
        .execute(TradeIntent::MarginOpen {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Long,
            quantity: Qty::new_unchecked(dec!(1)),
            price: Price::new_unchecked(dec!(1000)),
            leverage: Leverage::new(dec!(2)).unwrap(),
        })
        .unwrap();

    // mark 240: unrealized -760, equity ~240 <= 250 maintenance
    let report = engine.on_price_tick(tick("BTCUSDT", dec!(239), dec!(241), 1_000));
    assert_eq!(report.positions_liquidated, 1);
    assert!(engine.list_margin_positions(account).is_empty());

    // cash: 1000 - 1 open fee - 760 loss - 0.24 close fee
    let account_state = engine.account(account).unwrap();
    assert_eq!(account_state.cash_balance.value(), dec!(238.76));
    assert_eq!(account_state.margin_used.value(), dec!(0));

    let liquidated = engine
        .events()
        .iter()
        .any(|e| matches!(e.payload, EventPayload::Liquidation(_)));
    assert!(liquidated);
}

#[test]
fn stop_out_level_is_read_from_config() {
    let open = |engine: &mut Engine, account: AccountId| {
        engine
            .execute(TradeIntent::MarginOpen {
                account_id: account,
                symbol: Symbol::new("BTCUSDT"),
                side: Side::Long,
                quantity: Qty::new_unchecked(dec!(1)),
                price: Price::new_unchecked(dec!(1000)),
                leverage: Leverage::new(dec!(2)).unwrap(),
            })
            .unwrap();
    };

    // marked to mid 350: equity 349, margin level 349/500 = 69.8%.
    // at the default 50% level the account holds.
    let (mut engine, account) = margin_engine(dec!(1000));
    open(&mut engine, account);
    let report = engine.on_price_tick(tick("BTCUSDT", dec!(349), dec!(351), 1_000));
    assert_eq!(report.positions_liquidated, 0);
    assert_eq!(engine.list_margin_positions(account).len(), 1);

    // the same mark with the level raised to 80% stops the account out
    let mut config = EngineConfig::default();
    config.margin.stop_out_level_pct = dec!(80);
    let mut engine = Engine::new(config);
    let account = engine
        .init_account(OwnerId(1), AccountKind::Margin, Quote::new(dec!(1000)), "USDT")
        .unwrap();
    open(&mut engine, account);
    let report = engine.on_price_tick(tick("BTCUSDT", dec!(349), dec!(351), 1_000));
    assert_eq!(report.positions_liquidated, 1);
    assert!(engine.list_margin_positions(account).is_empty());
}

#[test]
fn stop_out_closes_worst_position_first() {
    let (mut engine, account) = margin_engine(dec!(1000));
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        engine
            .execute(TradeIntent::MarginOpen {
                account_id: account,
                symbol: Symbol::new(symbol),
                side: Side::Long,
                quantity: Qty::new_unchecked(dec!(1)),
                price: Price::new_unchecked(dec!(1000)),
                leverage: Leverage::new(dec!(2)).unwrap(),
            })
            .unwrap();
    }

    // only BTC crashes. equity = 998 - 600 = 398 <= 500 total maintenance
    let report = engine.on_price_tick(tick("BTCUSDT", dec!(400), dec!(400), 1_000));

    // one forced close restores health; the ETH position survives
    assert_eq!(report.positions_liquidated, 1);
    let survivors = engine.list_margin_positions(account);
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].symbol.as_str(), "ETHUSDT");
}

#[test]
fn shortfall_is_flagged_when_equity_stays_negative() {
    let (mut engine, account) = margin_engine(dec!(2000));
    engine
        .execute(TradeIntent::MarginOpen {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Long,
            quantity: Qty::new_unchecked(dec!(1)),
            price: Price::new_unchecked(dec!(10000)),
            leverage: Leverage::new(dec!(10)).unwrap(),
        })
        .unwrap();

    // gap through the liquidation price: loss 2500 against ~1990 cash
    let report = engine.on_price_tick(tick("BTCUSDT", dec!(7500), dec!(7500), 1_000));
    assert_eq!(report.positions_liquidated, 1);

    let account_state = engine.account(account).unwrap();
    assert!(account_state.cash_balance.is_negative());

    let flagged = engine.events().iter().any(|e| {
        matches!(
            &e.payload,
            EventPayload::LiquidationShortfall(s) if s.account_id == account
        )
    });
    assert!(flagged);
}

#[test]
fn failed_trigger_cancels_order_and_leaves_ledger_clean() {
    let (mut engine, account) = spot_engine(dec!(100));
    engine
        .place_order(OrderSpec {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            quantity: Qty::new_unchecked(dec!(1)),
            limit_price: Some(Price::new_unchecked(dec!(50000))),
            stop_price: None,
        })
        .unwrap();

    let report = engine.on_price_tick(tick("BTCUSDT", dec!(49000), dec!(49500), 1_000));
    assert_eq!(report.orders_filled, 0);
    assert_eq!(report.orders_cancelled, 1);

    assert!(engine.pending_orders(account).is_empty());
    let history = engine.order_history(account);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OrderStatus::Cancelled);

    // the failed execution left no trace in the ledger
    assert_eq!(engine.ledger_page(account, 0).len(), 1);
    assert_eq!(engine.account(account).unwrap().cash_balance.value(), dec!(100));
}

#[test]
fn replay_rebuilds_identical_state() {
    let mut log = MemoryLog::new();
    let owner = OwnerId(9);

    let mut live = Engine::new(EngineConfig::default());
    let record = |log: &mut MemoryLog, command: LoggedCommand, t: i64| {
        let sequence = log.next_sequence(owner);
        log.append(
            owner,
            LogRecord {
                sequence,
                timestamp: Timestamp::from_millis(t),
                command,
            },
        )
        .unwrap();
    };

    let init = LoggedCommand::InitAccount {
        owner_id: owner,
        kind: AccountKind::Spot,
        initial_balance: Quote::new(dec!(10000)),
        currency: "USDT".into(),
    };
    record(&mut log, init, 0);
    let account = live
        .init_account(owner, AccountKind::Spot, Quote::new(dec!(10000)), "USDT")
        .unwrap();

    for (qty, price, t) in [(dec!(0.1), dec!(50000), 1), (dec!(0.05), dec!(51000), 2)] {
        let intent = TradeIntent::SpotBuy {
            account_id: account,
            symbol: Symbol::new("BTCUSDT"),
            quantity: Qty::new_unchecked(qty),
            price: Price::new_unchecked(price),
            reference: "manual".into(),
        };
        record(&mut log, LoggedCommand::Execute(intent.clone()), t);
        live.set_time(Timestamp::from_millis(t));
        live.execute(intent).unwrap();
    }

    let mut rebuilt = Engine::new(EngineConfig::default());
    rebuilt.replay(&log).unwrap();

    assert_eq!(
        rebuilt.account(account).unwrap().cash_balance,
        live.account(account).unwrap().cash_balance
    );
    let live_pos = &live.list_spot_positions(account)[0];
    let rebuilt_pos = &rebuilt.list_spot_positions(account)[0];
    assert_eq!(rebuilt_pos.quantity, live_pos.quantity);
    assert_eq!(rebuilt_pos.avg_cost, live_pos.avg_cost);
    assert_eq!(
        rebuilt.ledger_net_delta(account),
        live.ledger_net_delta(account)
    );
}
